//! Reading and filling existing AcroForm fields
//!
//! [`FormReader`] enumerates the interactive fields of a fillable PDF.
//! [`FormWriter`] loads the same PDF into an in-memory output document,
//! overwrites field values and saves the result to a new file. The input
//! file is never modified.

use crate::extractor::decode_pdf_string;
use crate::{open_document, PdfError};
use indexmap::IndexMap;
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Limit on /Kids nesting; guards against cyclic field trees
const MAX_FIELD_DEPTH: usize = 64;

/// The type of a form field, from its `/FT` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// `/Tx`
    Text,
    /// `/Btn` (checkboxes, radio buttons, push buttons)
    Button,
    /// `/Ch` (combo boxes, list boxes)
    Choice,
    /// `/Sig`
    Signature,
    /// Missing or unrecognised `/FT`
    Unknown,
}

impl FieldType {
    pub fn from_pdf_name(name: &[u8]) -> Self {
        match name {
            b"Tx" => Self::Text,
            b"Btn" => Self::Button,
            b"Ch" => Self::Choice,
            b"Sig" => Self::Signature,
            _ => Self::Unknown,
        }
    }

    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            Self::Text => "Tx",
            Self::Button => "Btn",
            Self::Choice => "Ch",
            Self::Signature => "Sig",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            other => write!(f, "/{}", other.as_pdf_name()),
        }
    }
}

/// A terminal form field from the document's AcroForm tree
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    /// Fully qualified name; hierarchical parts are joined with `.`
    pub name: String,
    pub field_type: FieldType,
    /// Current `/V` value
    pub value: Option<String>,
    /// Object holding the field dictionary
    pub id: ObjectId,
    /// Widget annotations for this field (may include `id` itself)
    pub widgets: Vec<ObjectId>,
}

/// Summary of one field as shown to users
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub field_type: String,
    pub current_value: String,
}

impl From<&FormField> for FieldInfo {
    fn from(field: &FormField) -> Self {
        Self {
            name: field.name.clone(),
            field_type: field.field_type.to_string(),
            current_value: field.value.clone().unwrap_or_default(),
        }
    }
}

/// Reads form fields from a PDF
#[derive(Debug)]
pub struct FormReader {
    pdf_path: PathBuf,
    fields: IndexMap<String, FormField>,
}

impl FormReader {
    pub fn new<P: Into<PathBuf>>(pdf_path: P) -> Self {
        Self {
            pdf_path: pdf_path.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.pdf_path
    }

    /// Load the PDF and extract its form fields.
    ///
    /// A PDF without an AcroForm loads successfully with no fields.
    pub fn load(&mut self) -> Result<(), PdfError> {
        if !self.pdf_path.exists() {
            return Err(PdfError::NotFound(self.pdf_path.clone()));
        }
        let doc = open_document(&self.pdf_path)?;
        self.fields = collect_fields(&doc);
        if self.fields.is_empty() {
            log::warn!(
                "{} does not appear to have fillable form fields",
                self.pdf_path.display()
            );
        }
        Ok(())
    }

    pub fn fields(&self) -> &IndexMap<String, FormField> {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Look up a single field; `None` when the name is not in the form
    pub fn field_info(&self, field_name: &str) -> Option<FieldInfo> {
        self.fields.get(field_name).map(FieldInfo::from)
    }

    /// Render the field listing
    pub fn format_fields(&self) -> String {
        if self.fields.is_empty() {
            return "No form fields found in the PDF.\n".to_string();
        }

        let mut out = String::new();
        let _ = writeln!(out, "\nFound {} form fields:", self.fields.len());
        let _ = writeln!(out, "{}", "-".repeat(50));
        for field in self.fields.values() {
            let info = FieldInfo::from(field);
            let _ = writeln!(out, "Field: {}", info.name);
            let _ = writeln!(out, "  Type: {}", info.field_type);
            let _ = writeln!(out, "  Current Value: {}", info.current_value);
            out.push('\n');
        }
        out
    }
}

/// Fills form fields and writes a new PDF
#[derive(Debug)]
pub struct FormWriter {
    pdf_path: PathBuf,
    doc: Option<Document>,
    fields: IndexMap<String, FormField>,
}

impl FormWriter {
    pub fn new<P: Into<PathBuf>>(pdf_path: P) -> Self {
        Self {
            pdf_path: pdf_path.into(),
            doc: None,
            fields: IndexMap::new(),
        }
    }

    /// Load the PDF into a fresh output document
    pub fn load(&mut self) -> Result<(), PdfError> {
        if !self.pdf_path.exists() {
            return Err(PdfError::NotFound(self.pdf_path.clone()));
        }
        let doc = open_document(&self.pdf_path)?;
        self.fields = collect_fields(&doc);
        self.doc = Some(doc);
        Ok(())
    }

    pub fn available_fields(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    pub fn fill_field(&mut self, field_name: &str, value: &str) -> Result<(), PdfError> {
        let mut values = BTreeMap::new();
        values.insert(field_name.to_string(), value.to_string());
        self.fill_fields(&values)
    }

    /// Fill several fields at once.
    ///
    /// Either every value is applied or none is: an unknown name or a
    /// failed write leaves the output document untouched.
    pub fn fill_fields(&mut self, values: &BTreeMap<String, String>) -> Result<(), PdfError> {
        let doc = self.doc.as_ref().ok_or(PdfError::NotLoaded)?;
        if doc.get_pages().is_empty() {
            return Err(PdfError::NoPages);
        }

        if let Some(unknown) = values.keys().find(|name| !self.fields.contains_key(*name)) {
            return Err(PdfError::UnknownField(unknown.clone()));
        }

        let mut working = doc.clone();
        for (name, value) in values {
            let field = &self.fields[name.as_str()];
            apply_value(&mut working, field, value)?;
            log::debug!("Set {} = {:?}", name, value);
        }
        set_need_appearances(&mut working)?;

        for (name, value) in values {
            if let Some(field) = self.fields.get_mut(name.as_str()) {
                field.value = Some(value.clone());
            }
        }
        self.doc = Some(working);
        Ok(())
    }

    /// Save the output document, creating parent directories as needed
    pub fn save<P: AsRef<Path>>(&mut self, output_path: P) -> Result<(), PdfError> {
        let doc = self.doc.as_mut().ok_or(PdfError::NotLoaded)?;
        save_document(doc, output_path.as_ref())?;
        log::info!("Filled PDF saved to: {}", output_path.as_ref().display());
        Ok(())
    }
}

/// Read the fields of a PDF; failures are logged and yield an empty map
pub fn read_pdf_fields<P: Into<PathBuf>>(pdf_path: P) -> IndexMap<String, FormField> {
    let mut reader = FormReader::new(pdf_path);
    match reader.load() {
        Ok(()) => reader.fields,
        Err(e) => {
            log::error!("Error loading PDF: {}", e);
            IndexMap::new()
        }
    }
}

/// Fill a form and save it to `output_path`
pub fn fill_pdf_form<P: Into<PathBuf>, Q: AsRef<Path>>(
    input_path: P,
    values: &BTreeMap<String, String>,
    output_path: Q,
) -> Result<(), PdfError> {
    let mut writer = FormWriter::new(input_path);
    writer.load()?;
    writer.fill_fields(values)?;
    writer.save(output_path)
}

/// Fill a single field and save the PDF to `output_path`
pub fn fill_single_field<P: Into<PathBuf>, Q: AsRef<Path>>(
    input_path: P,
    field_name: &str,
    value: &str,
    output_path: Q,
) -> Result<(), PdfError> {
    let mut writer = FormWriter::new(input_path);
    writer.load()?;
    writer.fill_field(field_name, value)?;
    writer.save(output_path)
}

/// Serialize a document, creating parent directories as needed
pub(crate) fn save_document(doc: &mut Document, output_path: &Path) -> Result<(), PdfError> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = BufWriter::new(File::create(output_path)?);
    doc.save_to(&mut file)?;
    file.flush()?;
    Ok(())
}

/// Encode a value as a PDF text string
pub(crate) fn text_string(value: &str) -> Object {
    if value.chars().all(|c| (c as u32) < 0x100) {
        Object::String(
            value.chars().map(|c| c as u8).collect(),
            StringFormat::Literal,
        )
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in value.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Document-level AcroForm dictionary, if any
fn acroform_dict(doc: &Document) -> Option<&Dictionary> {
    let root = doc.trailer.get(b"Root").ok()?;
    let catalog = resolve(doc, root)?.as_dict().ok()?;
    let acroform = catalog.get(b"AcroForm").ok()?;
    resolve(doc, acroform)?.as_dict().ok()
}

/// Collect terminal fields in document order
pub(crate) fn collect_fields(doc: &Document) -> IndexMap<String, FormField> {
    let mut fields = IndexMap::new();

    let Some(acroform) = acroform_dict(doc) else {
        return fields;
    };
    let Some(Ok(entries)) = acroform
        .get(b"Fields")
        .ok()
        .and_then(|f| resolve(doc, f))
        .map(Object::as_array)
    else {
        return fields;
    };

    for entry in entries {
        if let Object::Reference(id) = entry {
            walk_field_tree(doc, *id, None, None, 0, &mut fields);
        }
    }

    fields
}

/// Recursively walk the field tree. Intermediate nodes carry partial names
/// and may pass their `/FT` down to children.
fn walk_field_tree(
    doc: &Document,
    field_id: ObjectId,
    parent_name: Option<&str>,
    inherited_ft: Option<FieldType>,
    depth: usize,
    fields: &mut IndexMap<String, FormField>,
) {
    if depth >= MAX_FIELD_DEPTH {
        return;
    }
    let Ok(dict) = doc.get_dictionary(field_id) else {
        return;
    };

    let partial = dict
        .get(b"T")
        .ok()
        .and_then(|t| resolve(doc, t))
        .and_then(|t| t.as_str().ok())
        .map(decode_pdf_string);

    let full_name = match (parent_name, partial) {
        (Some(parent), Some(name)) => format!("{}.{}", parent, name),
        (Some(parent), None) => parent.to_string(),
        (None, Some(name)) => name,
        (None, None) => String::new(),
    };

    let field_type = match dict.get(b"FT") {
        Ok(Object::Name(name)) => Some(FieldType::from_pdf_name(name)),
        _ => inherited_ft,
    };

    let kids: Vec<ObjectId> = dict
        .get(b"Kids")
        .ok()
        .and_then(|k| resolve(doc, k))
        .and_then(|k| k.as_array().ok())
        .map(|arr| {
            arr.iter()
                .filter_map(|kid| kid.as_reference().ok())
                .collect()
        })
        .unwrap_or_default();

    // Kids with /T are child fields; kids without are this field's widgets
    let has_child_fields = kids.iter().any(|kid| {
        doc.get_dictionary(*kid)
            .map(|d| d.has(b"T"))
            .unwrap_or(false)
    });

    if has_child_fields {
        for kid in kids {
            walk_field_tree(doc, kid, Some(&full_name), field_type, depth + 1, fields);
        }
        return;
    }

    if full_name.is_empty() {
        return;
    }

    let widgets = if kids.is_empty() { vec![field_id] } else { kids };
    let value = dict
        .get(b"V")
        .ok()
        .and_then(|v| resolve(doc, v))
        .and_then(field_value);

    fields
        .entry(full_name.clone())
        .and_modify(|existing: &mut FormField| existing.widgets.extend(widgets.iter().copied()))
        .or_insert(FormField {
            name: full_name,
            field_type: field_type.unwrap_or(FieldType::Unknown),
            value,
            id: field_id,
            widgets,
        });
}

fn field_value(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        Object::Array(items) => {
            let values: Vec<String> = items.iter().filter_map(field_value).collect();
            (!values.is_empty()).then(|| values.join(", "))
        }
        _ => None,
    }
}

fn dict_mut(doc: &mut Document, id: ObjectId) -> Result<&mut Dictionary, PdfError> {
    Ok(doc.get_object_mut(id)?.as_dict_mut()?)
}

/// Write one value into a field and refresh its widgets
fn apply_value(doc: &mut Document, field: &FormField, value: &str) -> Result<(), PdfError> {
    match field.field_type {
        FieldType::Button => {
            let state = if value.is_empty() { "Off" } else { value };
            dict_mut(doc, field.id)?.set("V", Object::Name(state.as_bytes().to_vec()));
            for widget in &field.widgets {
                let widget_state = appearance_state(doc, *widget, state.as_bytes());
                dict_mut(doc, *widget)?.set("AS", Object::Name(widget_state));
            }
        }
        _ => {
            dict_mut(doc, field.id)?.set("V", text_string(value));
            // Stale appearances would keep showing the old value
            for widget in &field.widgets {
                dict_mut(doc, *widget)?.remove(b"AP");
            }
        }
    }
    Ok(())
}

/// Appearance state a button widget should show for `state`. Widgets whose
/// normal appearances do not define `state` (the other kids of a radio
/// group) are turned off.
fn appearance_state(doc: &Document, widget: ObjectId, state: &[u8]) -> Vec<u8> {
    let normal = doc
        .get_dictionary(widget)
        .ok()
        .and_then(|w| w.get(b"AP").ok())
        .and_then(|ap| resolve(doc, ap))
        .and_then(|ap| ap.as_dict().ok())
        .and_then(|ap| ap.get(b"N").ok())
        .and_then(|n| resolve(doc, n))
        .and_then(|n| n.as_dict().ok());

    match normal {
        Some(states) if !states.has(state) => b"Off".to_vec(),
        _ => state.to_vec(),
    }
}

/// Ask viewers to regenerate field appearances
fn set_need_appearances(doc: &mut Document) -> Result<(), PdfError> {
    let root_id = doc.trailer.get(b"Root")?.as_reference()?;
    let acroform_ref = match doc.get_dictionary(root_id)?.get(b"AcroForm")? {
        Object::Reference(id) => Some(*id),
        _ => None,
    };

    let acroform = match acroform_ref {
        Some(id) => dict_mut(doc, id)?,
        None => dict_mut(doc, root_id)?
            .get_mut(b"AcroForm")?
            .as_dict_mut()?,
    };
    acroform.set("NeedAppearances", Object::Boolean(true));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    /// One page with a flat text field and a hierarchical checkbox group
    fn form_document() -> Document {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.new_object_id();

        let name_id = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Tx",
            "T" => Object::string_literal("Name"),
            "V" => Object::string_literal("Old"),
            "Rect" => vec![Object::Integer(72), Object::Integer(700), Object::Integer(272), Object::Integer(720)],
            "P" => page_id,
        });
        let agree_widget = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "Rect" => vec![Object::Integer(72), Object::Integer(650), Object::Integer(87), Object::Integer(665)],
            "P" => page_id,
        });
        let agree_id = doc.add_object(dictionary! {
            "T" => Object::string_literal("agree"),
            "Kids" => vec![agree_widget.into()],
        });
        let group_id = doc.add_object(dictionary! {
            "FT" => "Btn",
            "T" => Object::string_literal("terms"),
            "Kids" => vec![agree_id.into()],
        });
        if let Ok(dict) = doc.get_object_mut(agree_id).and_then(Object::as_dict_mut) {
            dict.set("Parent", group_id);
        }

        doc.objects.insert(
            page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(612), Object::Integer(792)],
                "Annots" => vec![name_id.into(), agree_widget.into()],
            }),
        );
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => Object::Integer(1),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "AcroForm" => dictionary! {
                "Fields" => vec![name_id.into(), group_id.into()],
            },
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    #[test]
    fn test_collect_fields_walks_hierarchy() {
        let doc = form_document();
        let fields = collect_fields(&doc);
        let names: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Name", "terms.agree"]);

        let name = &fields["Name"];
        assert_eq!(name.field_type, FieldType::Text);
        assert_eq!(name.value.as_deref(), Some("Old"));
        assert_eq!(name.widgets, vec![name.id]);

        let agree = &fields["terms.agree"];
        assert_eq!(agree.field_type, FieldType::Button);
        assert_eq!(agree.widgets.len(), 1);
        assert_ne!(agree.widgets[0], agree.id);
    }

    #[test]
    fn test_apply_values_inline_acroform() {
        let mut doc = form_document();
        let fields = collect_fields(&doc);
        apply_value(&mut doc, &fields["Name"], "Jane").unwrap();
        apply_value(&mut doc, &fields["terms.agree"], "Yes").unwrap();
        set_need_appearances(&mut doc).unwrap();

        let refreshed = collect_fields(&doc);
        assert_eq!(refreshed["Name"].value.as_deref(), Some("Jane"));
        assert_eq!(refreshed["terms.agree"].value.as_deref(), Some("Yes"));

        let widget = doc.get_dictionary(fields["terms.agree"].widgets[0]).unwrap();
        assert_eq!(widget.get(b"AS").unwrap().as_name().unwrap(), b"Yes");
        let acroform = acroform_dict(&doc).unwrap();
        assert_eq!(acroform.get(b"NeedAppearances").unwrap().as_bool().unwrap(), true);
    }

    #[test]
    fn test_radio_group_selects_matching_kid_only() {
        let mut doc = Document::with_version("1.7");
        let mut kids = Vec::new();
        for on_state in ["A", "B"] {
            kids.push(Object::from(doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Widget",
                "AS" => "Off",
                "AP" => dictionary! {
                    "N" => dictionary! { on_state => Object::Null, "Off" => Object::Null },
                },
            })));
        }
        let radio_id = doc.add_object(dictionary! {
            "FT" => "Btn",
            "Ff" => Object::Integer(1 << 15),
            "T" => Object::string_literal("choice"),
            "Kids" => kids.clone(),
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "AcroForm" => dictionary! { "Fields" => vec![Object::from(radio_id)] },
        });
        doc.trailer.set("Root", catalog_id);

        let fields = collect_fields(&doc);
        assert_eq!(fields["choice"].widgets.len(), 2);
        apply_value(&mut doc, &fields["choice"], "B").unwrap();

        let state_of = |kid: &Object| {
            let id = kid.as_reference().unwrap();
            doc.get_dictionary(id).unwrap().get(b"AS").unwrap().as_name().unwrap().to_vec()
        };
        assert_eq!(state_of(&kids[0]), b"Off");
        assert_eq!(state_of(&kids[1]), b"B");
        assert_eq!(collect_fields(&doc)["choice"].value.as_deref(), Some("B"));
    }

    #[test]
    fn test_no_acroform_yields_no_fields() {
        let mut doc = Document::with_version("1.5");
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog" });
        doc.trailer.set("Root", catalog_id);
        assert!(collect_fields(&doc).is_empty());
    }

    #[test]
    fn test_text_string_encoding() {
        assert_eq!(
            text_string("Café"),
            Object::String(b"Caf\xe9".to_vec(), StringFormat::Literal)
        );
        match text_string("Zoë Ω") {
            Object::String(bytes, StringFormat::Hexadecimal) => {
                assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
                assert_eq!(decode_pdf_string(&bytes), "Zoë Ω");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_field_type_display() {
        assert_eq!(FieldType::from_pdf_name(b"Tx").to_string(), "/Tx");
        assert_eq!(FieldType::from_pdf_name(b"Xyz"), FieldType::Unknown);
        assert_eq!(FieldType::Unknown.to_string(), "Unknown");
    }

    #[test]
    fn test_writer_requires_load() {
        let mut writer = FormWriter::new("unused.pdf");
        assert!(matches!(
            writer.fill_field("Name", "x"),
            Err(PdfError::NotLoaded)
        ));
        assert!(matches!(writer.save("out.pdf"), Err(PdfError::NotLoaded)));
    }
}
