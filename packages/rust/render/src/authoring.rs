//! Built-in dossier template.
//!
//! Produces a minimal but complete `.docx` whose placeholders bind every field
//! of a document request, so a fresh installation can generate dossiers
//! before anyone has designed a branded template in a word processor.

use std::fs::{self, File};
use std::path::Path;

use tracing::info;

use darwin_shared::{DarwinError, Result};

use crate::docx::{self, Part};
use crate::template::text_to_run_xml;

const WORD_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri" w:cs="Calibri"/><w:sz w:val="22"/><w:lang w:val="fr-FR"/></w:rPr></w:rPrDefault><w:pPrDefault><w:pPr><w:spacing w:after="120"/></w:pPr></w:pPrDefault></w:docDefaults><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style><w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/><w:basedOn w:val="Normal"/><w:pPr><w:jc w:val="center"/><w:spacing w:before="2400" w:after="480"/></w:pPr><w:rPr><w:b/><w:color w:val="1F3864"/><w:sz w:val="48"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Subtitle"><w:name w:val="Subtitle"/><w:basedOn w:val="Normal"/><w:pPr><w:jc w:val="center"/></w:pPr><w:rPr><w:sz w:val="32"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:keepNext/><w:spacing w:before="360" w:after="120"/><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:b/><w:color w:val="2E5090"/><w:sz w:val="32"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="80"/><w:outlineLvl w:val="1"/></w:pPr><w:rPr><w:b/><w:color w:val="2E5090"/><w:sz w:val="26"/></w:rPr></w:style><w:style w:type="table" w:styleId="TableGrid"><w:name w:val="Table Grid"/><w:tblPr><w:tblBorders><w:top w:val="single" w:sz="4" w:space="0" w:color="808080"/><w:left w:val="single" w:sz="4" w:space="0" w:color="808080"/><w:bottom w:val="single" w:sz="4" w:space="0" w:color="808080"/><w:right w:val="single" w:sz="4" w:space="0" w:color="808080"/><w:insideH w:val="single" w:sz="4" w:space="0" w:color="808080"/><w:insideV w:val="single" w:sz="4" w:space="0" w:color="808080"/></w:tblBorders></w:tblPr></w:style></w:styles>"#;

/// Header cell background.
const HEADER_FILL: &str = "D9E2F3";

// ---------------------------------------------------------------------------
// Body builder
// ---------------------------------------------------------------------------

/// Accumulates `<w:body>` content.
#[derive(Default)]
struct BodyBuilder {
    xml: String,
}

impl BodyBuilder {
    fn styled(&mut self, style: &str, text: &str) -> &mut Self {
        self.xml.push_str(&format!(
            r#"<w:p><w:pPr><w:pStyle w:val="{style}"/></w:pPr>{}</w:p>"#,
            run(text, false)
        ));
        self
    }

    fn title(&mut self, text: &str) -> &mut Self {
        self.styled("Title", text)
    }

    fn subtitle(&mut self, text: &str) -> &mut Self {
        self.styled("Subtitle", text)
    }

    fn heading(&mut self, level: u8, text: &str) -> &mut Self {
        self.styled(&format!("Heading{level}"), text)
    }

    fn paragraph(&mut self, text: &str) -> &mut Self {
        self.xml.push_str(&format!("<w:p>{}</w:p>", run(text, false)));
        self
    }

    fn labelled(&mut self, label: &str, text: &str) -> &mut Self {
        self.xml.push_str(&format!(
            "<w:p>{}{}</w:p>",
            run(&format!("{label} : "), true),
            run(text, false)
        ));
        self
    }

    /// A paragraph holding only a `{%p … %}` control tag.
    fn control(&mut self, statement: &str) -> &mut Self {
        self.paragraph(&format!("{{%p {statement} %}}"))
    }

    fn page_break(&mut self) -> &mut Self {
        self.xml.push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#);
        self
    }

    /// Two-column key/value table with static labels.
    fn info_table(&mut self, rows: &[(&str, &str)]) -> &mut Self {
        self.xml.push_str(&table_open(2));
        for (label, value) in rows {
            self.xml.push_str("<w:tr>");
            self.xml.push_str(&cell(label, true));
            self.xml.push_str(&cell(value, false));
            self.xml.push_str("</w:tr>");
        }
        self.xml.push_str("</w:tbl>");
        self.paragraph("")
    }

    /// Header row plus one row repeated for each element of `collection`.
    fn repeating_table(&mut self, collection: &str, columns: &[(&str, &str)]) -> &mut Self {
        let item = "row";
        self.xml.push_str(&table_open(columns.len()));

        self.xml.push_str(r#"<w:tr><w:trPr><w:tblHeader/></w:trPr>"#);
        for (header, _) in columns {
            self.xml.push_str(&cell(header, true));
        }
        self.xml.push_str("</w:tr>");

        self.xml.push_str(&control_row(&format!("for {item} in {collection}"), columns.len()));
        self.xml.push_str("<w:tr>");
        for (_, field) in columns {
            self.xml.push_str(&cell(&format!("{{{{ {item}.{field} }}}}"), false));
        }
        self.xml.push_str("</w:tr>");
        self.xml.push_str(&control_row("endfor", columns.len()));

        self.xml.push_str("</w:tbl>");
        self.paragraph("")
    }

    fn finish(self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{WORD_NS}"><w:body>{}<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1417" w:right="1417" w:bottom="1417" w:left="1417" w:header="708" w:footer="708" w:gutter="0"/></w:sectPr></w:body></w:document>"#,
            self.xml
        )
    }
}

fn run(text: &str, bold: bool) -> String {
    let props = if bold { "<w:rPr><w:b/></w:rPr>" } else { "" };
    format!(
        r#"<w:r>{props}<w:t xml:space="preserve">{}</w:t></w:r>"#,
        text_to_run_xml(text)
    )
}

fn cell(text: &str, header: bool) -> String {
    let shading = if header {
        format!(r#"<w:tcPr><w:shd w:val="clear" w:color="auto" w:fill="{HEADER_FILL}"/></w:tcPr>"#)
    } else {
        String::new()
    };
    format!("<w:tc>{shading}<w:p>{}</w:p></w:tc>", run(text, header))
}

fn control_row(statement: &str, columns: usize) -> String {
    format!(
        r#"<w:tr><w:tc><w:tcPr><w:gridSpan w:val="{columns}"/></w:tcPr><w:p>{}</w:p></w:tc></w:tr>"#,
        run(&format!("{{%tr {statement} %}}"), false)
    )
}

fn table_open(columns: usize) -> String {
    let width = 9000 / columns.max(1);
    let grid: String = (0..columns)
        .map(|_| format!(r#"<w:gridCol w:w="{width}"/>"#))
        .collect();
    format!(
        r#"<w:tbl><w:tblPr><w:tblStyle w:val="TableGrid"/><w:tblW w:w="5000" w:type="pct"/></w:tblPr><w:tblGrid>{grid}</w:tblGrid>"#
    )
}

// ---------------------------------------------------------------------------
// The dossier
// ---------------------------------------------------------------------------

fn document_xml() -> String {
    let mut body = BodyBuilder::default();

    body.title("DOSSIER D'ARCHITECTURE TECHNIQUE")
        .subtitle("{{ titre_projet }}")
        .info_table(&[
            ("Chef de projet", "{{ chef_projet }}"),
            ("Contact technique", "{{ contact_tech }}"),
            ("Date", "{{ date }}"),
        ])
        .paragraph("{{ description_doc }}")
        .page_break();

    body.heading(1, "1. Objet du document")
        .paragraph("{{ objet_document }}")
        .heading(2, "1.1 Documents de référence")
        .repeating_table(
            "documents_reference",
            &[("Émetteur", "emetteur"), ("Document", "document"), ("Version", "version")],
        )
        .heading(2, "1.2 Glossaire")
        .repeating_table(
            "glossaire",
            &[("Abréviation", "abreviation"), ("Signification", "signification")],
        );

    body.heading(1, "2. Spécifications fonctionnelles")
        .heading(2, "2.1 Acteurs")
        .repeating_table(
            "acteurs",
            &[
                ("Acteur", "acteur"),
                ("Rôle", "role"),
                ("Droits", "droits"),
                ("Commentaires", "commentaires"),
            ],
        )
        .heading(2, "2.2 Schéma fonctionnel")
        .control("if has_schema")
        .paragraph("{{ schema_description }}")
        .control("for schema in schemas")
        .labelled("Schéma", "{{ schema.titre }}")
        .paragraph("{{ schema.description }}")
        .control("endfor")
        .control("else")
        .paragraph("Aucun schéma fonctionnel fourni.")
        .control("endif")
        .heading(2, "2.3 Briques fonctionnelles")
        .repeating_table(
            "briques_fonctionnelles",
            &[("Brique", "brique"), ("Description", "description")],
        )
        .heading(2, "2.4 Échanges de données")
        .repeating_table(
            "echanges_donnees",
            &[
                ("Type", "type_echange"),
                ("Brique", "brique_fonctionnelle"),
                ("Source", "source"),
                ("Destination", "destination"),
                ("Données", "type_donnees"),
                ("Volumétrie", "volumetrie"),
                ("Volumétrie / jour", "volumetrie_journaliere"),
                ("Fichiers / jour", "nb_fichiers_jour"),
                ("Fréquence", "frequence"),
                ("HNO", "hno"),
            ],
        );

    body.heading(1, "3. Architecture technique")
        .heading(2, "3.1 Composants physiques")
        .repeating_table(
            "composants_physiques",
            &[
                ("Type de machine", "type_machine"),
                ("Environnement", "environnement"),
                ("Cluster", "cluster"),
            ],
        )
        .heading(2, "3.2 Description de l'architecture")
        .paragraph("{{ description_architecture }}")
        .heading(2, "3.3 Authentification")
        .paragraph("{{ description_authentification }}")
        .heading(2, "3.4 Administration technique")
        .paragraph("{{ description_administrationtechnique }}")
        .heading(2, "3.5 Administration fonctionnelle")
        .paragraph("{{ description_adminfonctionnelle }}")
        .heading(2, "3.6 Échanges inter-applicatifs")
        .paragraph("{{ description_interapplicative }}")
        .heading(2, "3.7 Flux réseau")
        .repeating_table(
            "flux_reseau",
            &[
                ("Type", "type_echange"),
                ("Brique", "brique_fonctionnelle"),
                ("Source", "source"),
                ("Destination", "destination"),
                ("Description", "description"),
                ("Flux", "type_flux"),
            ],
        )
        .heading(2, "3.8 Choix technologiques")
        .repeating_table(
            "choix_technologiques",
            &[("Tiers", "tiers"), ("Produit", "produit"), ("Version", "version")],
        )
        .heading(2, "3.9 Plan de reprise")
        .labelled("Segmentation DR", "{{ segmentation_dr }}")
        .heading(2, "3.10 Noms DNS")
        .repeating_table(
            "dns_nom",
            &[("Nom DNS", "nom_dns"), ("Machine associée", "machine_associe")],
        );

    body.heading(1, "4. Cycle de vie")
        .heading(2, "4.1 Déploiement")
        .paragraph("{{ deploiement }}")
        .heading(2, "4.2 Migration et reprise de données")
        .paragraph("{{ migration_reprise }}")
        .heading(2, "4.3 Supervision")
        .paragraph("{{ supervision }}")
        .heading(2, "4.4 Sauvegarde et restauration")
        .paragraph("{{ sauvegarde_restauration }}");

    body.heading(1, "5. Dépendances")
        .heading(2, "5.1 Dépendances externes")
        .repeating_table(
            "dependances_externes",
            &[("Dépendance", "dependance"), ("Impact", "impact")],
        )
        .heading(2, "5.2 Applications dépendantes")
        .repeating_table(
            "dependance_app_externes",
            &[("Application", "name_application"), ("Impact", "description_impact")],
        );

    body.heading(1, "6. Besoins d'infrastructure")
        .heading(2, "6.1 Machines virtuelles")
        .repeating_table(
            "vms",
            &[
                ("Environnement", "environnement"),
                ("Nom", "nom"),
                ("Rôle", "role"),
                ("OS", "os"),
                ("vCPU", "cpu"),
                ("RAM (Go)", "ram"),
                ("Résilience", "resilience"),
            ],
        )
        .heading(2, "6.2 Conteneurs")
        .repeating_table(
            "conteneurs",
            &[
                ("Nom", "nom"),
                ("Image", "image"),
                ("Ports", "ports"),
                ("Volumes", "volumes"),
                ("CPU", "ressources_cpu"),
                ("RAM", "ressources_ram"),
            ],
        )
        .heading(2, "6.3 Bases de données")
        .repeating_table(
            "bases_donnees",
            &[
                ("Moteur", "moteur"),
                ("Version", "version"),
                ("Taille", "taille"),
                ("Sauvegarde", "backup"),
                ("Haute disponibilité", "ha"),
            ],
        )
        .heading(2, "6.4 Stockage objet")
        .repeating_table(
            "stockage",
            &[
                ("Buckets", "nb_buckets"),
                ("Taille totale", "taille_totale"),
                ("Rétention", "politique_retention"),
            ],
        )
        .heading(2, "6.5 Partages NFS")
        .repeating_table(
            "partages_nfs",
            &[
                ("Machine cliente", "machine_cliente"),
                ("Module applicatif", "module_applicatif"),
                ("Droits", "droits"),
            ],
        );

    body.heading(1, "7. Contraintes et niveaux de service")
        .heading(2, "7.1 Contraintes")
        .paragraph("{{ contraintes }}")
        .heading(2, "7.2 Niveaux de service")
        .paragraph("{{ niveau_services }}");

    body.finish()
}

/// Assemble the parts of the built-in template.
pub(crate) fn default_template_parts() -> Vec<Part> {
    vec![
        Part::new("[Content_Types].xml", CONTENT_TYPES),
        Part::new("_rels/.rels", PACKAGE_RELS),
        Part::new("word/_rels/document.xml.rels", DOCUMENT_RELS),
        Part::new("word/document.xml", document_xml()),
        Part::new("word/styles.xml", STYLES),
    ]
}

/// Write the built-in template to `path`, creating parent directories.
///
/// Refuses to overwrite an existing file.
pub fn write_default_template(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(DarwinError::validation(format!(
            "{} already exists, refusing to overwrite",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| DarwinError::io(parent, e))?;
    }

    let file = File::create_new(path).map_err(|e| DarwinError::io(path, e))?;
    docx::write_package(&default_template_parts(), file)?;

    info!(path = %path.display(), "wrote default template");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{preprocess, template::Template};

    #[test]
    fn default_template_parses() {
        let xml = document_xml();
        let prepared = preprocess::run_pipeline(&xml).unwrap();
        assert!(!prepared.contains("{%tr"));
        assert!(!prepared.contains("{%p"));
        Template::parse(&prepared).unwrap();
    }

    #[test]
    fn labels_are_escaped() {
        let xml = document_xml();
        assert!(xml.contains("DOSSIER D'ARCHITECTURE TECHNIQUE"));
        assert!(!xml.contains("<w:t xml:space=\"preserve\">&</w:t>"));
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates").join("dat_template.docx");
        write_default_template(&path).unwrap();
        assert!(path.is_file());

        let err = write_default_template(&path).unwrap_err();
        assert_eq!(err.kind().as_str(), "validation");
    }
}
