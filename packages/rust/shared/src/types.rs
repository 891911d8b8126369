//! Core domain types: the technical-architecture dossier request.
//!
//! Field names are the wire names of the request payload and, at the same
//! time, the placeholder names used by the dossier template. Every field is
//! defaulted so a partially filled request always deserializes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline invocation (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Generate a new time-sortable request identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Introduction
// ---------------------------------------------------------------------------

/// A reference document cited by the dossier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentReference {
    pub emetteur: String,
    pub document: String,
    pub version: String,
}

impl Default for DocumentReference {
    fn default() -> Self {
        Self {
            emetteur: String::new(),
            document: String::new(),
            version: "1.0".into(),
        }
    }
}

/// Glossary entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlossaryItem {
    pub abreviation: String,
    pub signification: String,
}

// ---------------------------------------------------------------------------
// Functional section
// ---------------------------------------------------------------------------

/// A person or team interacting with the system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Actor {
    pub acteur: String,
    pub role: String,
    pub droits: String,
    /// Rich text.
    pub commentaires: String,
}

/// Illustrated functional schema, shown only when `has_schema` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionalSchema {
    pub titre: String,
    /// Rich text.
    pub description: String,
    /// Optional image path.
    pub image: String,
}

/// Functional building block of the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionalBlock {
    pub brique: String,
    /// Rich text.
    pub description: String,
}

/// Data exchange and its volumetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataExchange {
    pub type_echange: String,
    pub brique_fonctionnelle: String,
    pub source: String,
    pub destination: String,
    pub type_donnees: String,
    pub volumetrie: String,
    pub volumetrie_journaliere: String,
    pub nb_fichiers_jour: String,
    pub frequence: String,
    /// Whether the exchange only happens outside business hours.
    pub hno: String,
}

impl Default for DataExchange {
    fn default() -> Self {
        Self {
            type_echange: String::new(),
            brique_fonctionnelle: String::new(),
            source: String::new(),
            destination: String::new(),
            type_donnees: String::new(),
            volumetrie: String::new(),
            volumetrie_journaliere: String::new(),
            nb_fichiers_jour: String::new(),
            frequence: String::new(),
            hno: default_no(),
        }
    }
}

// ---------------------------------------------------------------------------
// Technical section
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicalComponent {
    pub type_machine: String,
    pub environnement: String,
    pub cluster: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkFlow {
    pub type_echange: String,
    pub brique_fonctionnelle: String,
    pub source: String,
    pub destination: String,
    /// Rich text.
    pub description: String,
    pub type_flux: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnologyChoice {
    pub tiers: String,
    pub produit: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsName {
    pub nom_dns: String,
    pub machine_associe: String,
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// Something outside the application that the application depends on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalDependency {
    pub dependance: String,
    pub impact: String,
}

/// Another application that depends on this one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboundDependency {
    pub name_application: String,
    pub description_impact: String,
}

// ---------------------------------------------------------------------------
// Infrastructure needs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualMachine {
    pub environnement: String,
    pub nom: String,
    pub role: String,
    pub os: String,
    pub cpu: u32,
    /// RAM in GB.
    pub ram: u32,
    pub resilience: String,
}

impl Default for VirtualMachine {
    fn default() -> Self {
        Self {
            environnement: "Production".into(),
            nom: String::new(),
            role: String::new(),
            os: "Linux".into(),
            cpu: 2,
            ram: 4,
            resilience: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Container {
    pub nom: String,
    pub image: String,
    pub ports: String,
    pub volumes: String,
    pub ressources_cpu: String,
    pub ressources_ram: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Database {
    pub moteur: String,
    pub version: String,
    pub taille: String,
    pub backup: String,
    pub ha: String,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            moteur: "PostgreSQL".into(),
            version: String::new(),
            taille: String::new(),
            backup: String::new(),
            ha: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStorage {
    pub nb_buckets: String,
    pub taille_totale: String,
    pub politique_retention: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NfsShare {
    pub machine_cliente: String,
    pub module_applicatif: String,
    /// `r`, `w` or `rw`.
    pub droits: String,
}

impl Default for NfsShare {
    fn default() -> Self {
        Self {
            machine_cliente: String::new(),
            module_applicatif: String::new(),
            droits: "rw".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// DocumentRequest
// ---------------------------------------------------------------------------

/// Everything needed to produce one technical-architecture dossier.
///
/// Constructed once per invocation and passed by value through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentRequest {
    // General information
    pub titre_projet: String,
    pub chef_projet: String,
    pub contact_tech: String,
    pub date: String,
    pub description_doc: String,

    // Introduction
    pub objet_document: String,
    pub documents_reference: Vec<DocumentReference>,
    pub glossaire: Vec<GlossaryItem>,

    // Functional section
    pub acteurs: Vec<Actor>,
    pub has_schema: bool,
    pub schemas: Vec<FunctionalSchema>,
    pub schema_description: String,
    pub briques_fonctionnelles: Vec<FunctionalBlock>,
    pub echanges_donnees: Vec<DataExchange>,

    // Technical section
    pub composants_physiques: Vec<PhysicalComponent>,
    pub description_architecture: String,
    pub description_authentification: String,
    pub description_administrationtechnique: String,
    pub description_adminfonctionnelle: String,
    pub description_interapplicative: String,
    pub flux_reseau: Vec<NetworkFlow>,
    pub choix_technologiques: Vec<TechnologyChoice>,
    pub segmentation_dr: String,
    pub dns_nom: Vec<DnsName>,

    // Lifecycle
    pub deploiement: String,
    pub migration_reprise: String,
    pub supervision: String,
    pub sauvegarde_restauration: String,

    // Dependencies
    pub dependances_externes: Vec<ExternalDependency>,
    pub dependance_app_externes: Vec<OutboundDependency>,

    // Infrastructure needs
    pub vms: Vec<VirtualMachine>,
    pub conteneurs: Vec<Container>,
    pub bases_donnees: Vec<Database>,
    pub stockage: Vec<ObjectStorage>,
    pub partages_nfs: Vec<NfsShare>,
    pub contraintes: String,
    pub niveau_services: String,
}

impl Default for DocumentRequest {
    fn default() -> Self {
        Self {
            titre_projet: String::new(),
            chef_projet: String::new(),
            contact_tech: String::new(),
            date: String::new(),
            description_doc: String::new(),
            objet_document: String::new(),
            documents_reference: Vec::new(),
            glossaire: Vec::new(),
            acteurs: Vec::new(),
            has_schema: false,
            schemas: Vec::new(),
            schema_description: String::new(),
            briques_fonctionnelles: Vec::new(),
            echanges_donnees: Vec::new(),
            composants_physiques: Vec::new(),
            description_architecture: String::new(),
            description_authentification: String::new(),
            description_administrationtechnique: String::new(),
            description_adminfonctionnelle: String::new(),
            description_interapplicative: String::new(),
            flux_reseau: Vec::new(),
            choix_technologiques: Vec::new(),
            segmentation_dr: default_no(),
            dns_nom: Vec::new(),
            deploiement: String::new(),
            migration_reprise: String::new(),
            supervision: String::new(),
            sauvegarde_restauration: String::new(),
            dependances_externes: Vec::new(),
            dependance_app_externes: Vec::new(),
            vms: Vec::new(),
            conteneurs: Vec::new(),
            bases_donnees: Vec::new(),
            stockage: Vec::new(),
            partages_nfs: Vec::new(),
            contraintes: String::new(),
            niveau_services: String::new(),
        }
    }
}

impl DocumentRequest {
    /// Parse a request from its JSON payload.
    pub fn from_json(payload: &str) -> crate::Result<Self> {
        serde_json::from_str(payload)
            .map_err(|e| crate::DarwinError::validation(format!("invalid request payload: {e}")))
    }
}

fn default_no() -> String {
    "Non".into()
}
