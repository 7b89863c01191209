//! Form materialization
//!
//! Turns resolved [`FieldPosition`]s into AcroForm widgets on a copy of the
//! input PDF. Each widget is a merged field/widget dictionary added to
//! the page's `/Annots` and to the document's `/AcroForm /Fields`.

use crate::forms::{save_document, text_string};
use crate::positioner::FieldPosition;
use crate::{extractor, open_document, PdfError};
use bitflags::bitflags;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::Path;

/// Default appearance for text and choice widgets; size 0 means auto-fit
const DEFAULT_APPEARANCE: &str = "/Helv 0 Tf 0 g";
const CHECKBOX_APPEARANCE: &str = "/ZaDb 0 Tf 0 g";

/// Print flag for annotations
const ANNOT_PRINT: i64 = 4;

bitflags! {
    /// Field flags written to `/Ff`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FieldFlags: u32 {
        /// Bit 2: a value is required before submit
        const REQUIRED = 1 << 1;
        /// Bit 18: choice field is a combo box
        const COMBO = 1 << 17;
    }
}

/// The widget created for a field type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Text,
    Checkbox,
    Choice,
    Signature,
}

impl WidgetKind {
    /// Map a proposed field type; unrecognised types become text entry
    pub fn from_field_type(field_type: &str) -> Self {
        match field_type.trim().to_ascii_lowercase().as_str() {
            "checkbox" => Self::Checkbox,
            "dropdown" => Self::Choice,
            "signature" => Self::Signature,
            _ => Self::Text,
        }
    }

    pub fn pdf_field_type(&self) -> &'static str {
        match self {
            Self::Text => "Tx",
            Self::Checkbox => "Btn",
            Self::Choice => "Ch",
            Self::Signature => "Sig",
        }
    }
}

/// Dropdown options keyed by a case-insensitive substring of the field name.
/// The first matching pattern wins.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoicePresets {
    presets: Vec<(String, Vec<String>)>,
}

impl Default for ChoicePresets {
    fn default() -> Self {
        Self::empty().with_preset(
            "role",
            [
                "Designated Executive Broker",
                "Executive Broker",
                "Associate Broker",
                "Salesperson",
            ],
        )
    }
}

impl ChoicePresets {
    /// A table with no presets; every dropdown gets an empty option list
    pub fn empty() -> Self {
        Self {
            presets: Vec::new(),
        }
    }

    pub fn with_preset<S, I, O>(mut self, pattern: S, options: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = O>,
        O: Into<String>,
    {
        self.presets.push((
            pattern.into().to_lowercase(),
            options.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn options_for(&self, field_name: &str) -> &[String] {
        let name = field_name.to_lowercase();
        self.presets
            .iter()
            .find(|(pattern, _)| name.contains(pattern.as_str()))
            .map(|(_, options)| options.as_slice())
            .unwrap_or(&[])
    }
}

/// Outcome of a materialization run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    /// Widgets added to the document
    pub placed: usize,
    /// Positions on pages the document does not have
    pub skipped: usize,
    /// Positions whose widget could not be created
    pub failed: usize,
}

/// Adds form widgets to an existing PDF
#[derive(Debug, Clone, Default)]
pub struct FormMaterializer {
    presets: ChoicePresets,
}

impl FormMaterializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_presets(presets: ChoicePresets) -> Self {
        Self { presets }
    }

    pub fn presets(&self) -> &ChoicePresets {
        &self.presets
    }

    /// Add one widget per position to a copy of `input_path` and save it
    /// to `output_path`
    pub fn materialize<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        positions: &[FieldPosition],
        output_path: Q,
    ) -> Result<MaterializeReport, PdfError> {
        let mut doc = open_document(input_path)?;
        let report = self.add_widgets(&mut doc, positions)?;
        save_document(&mut doc, output_path.as_ref())?;
        log::info!(
            "Created fillable PDF: {} ({} placed, {} skipped, {} failed)",
            output_path.as_ref().display(),
            report.placed,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    /// Add widgets to an already-loaded document
    pub fn add_widgets(
        &self,
        doc: &mut Document,
        positions: &[FieldPosition],
    ) -> Result<MaterializeReport, PdfError> {
        let pages = doc.get_pages();
        let mut report = MaterializeReport::default();

        let mut by_page: BTreeMap<u32, Vec<&FieldPosition>> = BTreeMap::new();
        for position in positions {
            by_page.entry(position.page_number).or_default().push(position);
        }

        if positions.is_empty() {
            return Ok(report);
        }
        let acroform = ensure_acroform(doc)?;

        for (page_number, page_positions) in by_page {
            let Some(&page_id) = pages.get(&page_number) else {
                log::warn!(
                    "Page {} does not exist (document has {} pages), skipping {} fields",
                    page_number,
                    pages.len(),
                    page_positions.len()
                );
                report.skipped += page_positions.len();
                continue;
            };
            let origin = extractor::page_origin(doc, page_id);

            for position in page_positions {
                if position.field_name.trim().is_empty() {
                    log::warn!("Skipping field without a name on page {}", page_number);
                    report.failed += 1;
                    continue;
                }

                match self.add_widget(doc, acroform, page_id, origin, position) {
                    Ok(widget_id) => {
                        log::debug!(
                            "Added {} field '{}' on page {} as {:?}",
                            position.field_type,
                            position.field_name,
                            page_number,
                            widget_id
                        );
                        report.placed += 1;
                    }
                    Err(e) => {
                        log::error!("{}", e);
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    fn add_widget(
        &self,
        doc: &mut Document,
        acroform_id: ObjectId,
        page_id: ObjectId,
        origin: (f32, f32),
        position: &FieldPosition,
    ) -> Result<ObjectId, PdfError> {
        let widget_error = |reason: String| PdfError::Widget {
            field: position.field_name.clone(),
            reason,
        };

        let rect = pdf_rect(position, origin).ok_or_else(|| {
            widget_error(format!(
                "invalid geometry (x {}, y {}, width {}, height {})",
                position.x, position.y, position.width, position.height
            ))
        })?;

        let dict = self.widget_dictionary(position, page_id, rect);
        let widget_id = doc.add_object(dict);

        let attached = append_to_array(doc, acroform_id, b"Fields", widget_id)
            .map_err(|e| widget_error(format!("cannot register in AcroForm: {}", e)))
            .and_then(|()| {
                append_to_array(doc, page_id, b"Annots", widget_id).map_err(|e| {
                    remove_from_array(doc, acroform_id, b"Fields", widget_id);
                    widget_error(format!("cannot attach to page: {}", e))
                })
            });

        if attached.is_err() {
            doc.objects.remove(&widget_id);
        }
        attached.map(|()| widget_id)
    }

    fn widget_dictionary(
        &self,
        position: &FieldPosition,
        page_id: ObjectId,
        rect: [f32; 4],
    ) -> Dictionary {
        let kind = WidgetKind::from_field_type(&position.field_type);

        let mut flags = FieldFlags::empty();
        if position.required {
            flags |= FieldFlags::REQUIRED;
        }

        let mut dict = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => kind.pdf_field_type(),
            "T" => text_string(&position.field_name),
            "Rect" => rect.iter().map(|v| Object::Real(*v)).collect::<Vec<_>>(),
            "P" => page_id,
            "F" => ANNOT_PRINT,
        };
        if !position.description.is_empty() {
            dict.set("TU", text_string(&position.description));
        }

        match kind {
            WidgetKind::Text => {
                dict.set("DA", Object::string_literal(DEFAULT_APPEARANCE));
            }
            WidgetKind::Checkbox => {
                dict.set("V", Object::Name(b"Off".to_vec()));
                dict.set("AS", Object::Name(b"Off".to_vec()));
                dict.set("DA", Object::string_literal(CHECKBOX_APPEARANCE));
                // ZapfDingbats "4" is a check mark
                dict.set("MK", dictionary! { "CA" => Object::string_literal("4") });
            }
            WidgetKind::Choice => {
                flags |= FieldFlags::COMBO;
                let options: Vec<Object> = self
                    .presets
                    .options_for(&position.field_name)
                    .iter()
                    .map(|o| text_string(o))
                    .collect();
                dict.set("Opt", options);
                dict.set("DA", Object::string_literal(DEFAULT_APPEARANCE));
            }
            WidgetKind::Signature => {}
        }

        if !flags.is_empty() {
            dict.set("Ff", i64::from(flags.bits()));
        }
        dict
    }
}

/// Convert a top-left-origin box to a PDF `[llx lly urx ury]` rectangle.
/// `origin` is the page's top-left corner in user space.
fn pdf_rect(position: &FieldPosition, origin: (f32, f32)) -> Option<[f32; 4]> {
    let FieldPosition {
        x, y, width, height, ..
    } = *position;
    let valid = [x, y, width, height].iter().all(|v| v.is_finite()) && width > 0.0 && height > 0.0;
    if !valid {
        return None;
    }

    let (left, top) = (f64::from(origin.0), f64::from(origin.1));
    Some([
        (left + x) as f32,
        (top - (y + height)) as f32,
        (left + x + width) as f32,
        (top - y) as f32,
    ])
}

/// Make sure the catalog has an indirect AcroForm with the defaults widgets
/// rely on, returning its id
fn ensure_acroform(doc: &mut Document) -> Result<ObjectId, PdfError> {
    let root_id = doc.trailer.get(b"Root")?.as_reference()?;

    let existing = doc.get_dictionary(root_id)?.get(b"AcroForm").ok().cloned();
    let acroform_id = match existing {
        Some(Object::Reference(id)) => id,
        Some(Object::Dictionary(inline)) => {
            let id = doc.add_object(inline);
            doc.get_object_mut(root_id)?.as_dict_mut()?.set("AcroForm", id);
            id
        }
        _ => {
            let id = doc.add_object(dictionary! { "Fields" => Vec::<Object>::new() });
            doc.get_object_mut(root_id)?.as_dict_mut()?.set("AcroForm", id);
            id
        }
    };

    let needs_resources = !doc.get_dictionary(acroform_id)?.has(b"DR");
    let resources = if needs_resources {
        let helv = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let zadb = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "ZapfDingbats",
        });
        Some(dictionary! {
            "Font" => dictionary! { "Helv" => helv, "ZaDb" => zadb },
        })
    } else {
        None
    };

    let acroform = doc.get_object_mut(acroform_id)?.as_dict_mut()?;
    acroform.set("NeedAppearances", Object::Boolean(true));
    if !acroform.has(b"DA") {
        acroform.set("DA", Object::string_literal(DEFAULT_APPEARANCE));
    }
    if let Some(resources) = resources {
        acroform.set("DR", resources);
    }
    if !acroform.has(b"Fields") {
        acroform.set("Fields", Vec::<Object>::new());
    }

    Ok(acroform_id)
}

/// Append a reference to an array entry of `owner`, following an indirect
/// array or creating the entry when missing
fn append_to_array(
    doc: &mut Document,
    owner: ObjectId,
    key: &[u8],
    item: ObjectId,
) -> Result<(), PdfError> {
    let indirect = match doc.get_dictionary(owner)?.get(key) {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };

    if let Some(array_id) = indirect {
        doc.get_object_mut(array_id)?.as_array_mut()?.push(item.into());
        return Ok(());
    }

    let dict = doc.get_object_mut(owner)?.as_dict_mut()?;
    match dict.get_mut(key) {
        Ok(Object::Array(items)) => items.push(item.into()),
        _ => dict.set(key.to_vec(), vec![Object::from(item)]),
    }
    Ok(())
}

/// Remove a reference from an array entry of `owner`, if present
fn remove_from_array(doc: &mut Document, owner: ObjectId, key: &[u8], item: ObjectId) {
    let target = Object::Reference(item);
    let indirect = match doc.get_dictionary(owner).and_then(|d| d.get(key)) {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };
    let array = match indirect {
        Some(id) => doc.get_object_mut(id).and_then(Object::as_array_mut),
        None => doc
            .get_object_mut(owner)
            .and_then(Object::as_dict_mut)
            .and_then(|d| d.get_mut(key))
            .and_then(Object::as_array_mut),
    };
    if let Ok(items) = array {
        items.retain(|o| *o != target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document_with_pages(count: u32) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for _ in 0..count {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(612), Object::Integer(792)],
            });
            kids.push(Object::from(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(count as i64),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn position(name: &str, field_type: &str, page_number: u32) -> FieldPosition {
        FieldPosition {
            field_name: name.into(),
            field_type: field_type.into(),
            x: 100.0,
            y: 100.0,
            width: 150.0,
            height: 25.0,
            page_number,
            description: String::new(),
            required: false,
        }
    }

    fn widget<'a>(doc: &'a Document, page: u32, index: usize) -> &'a Dictionary {
        let page_id = doc.get_pages()[&page];
        let annots = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Annots")
            .unwrap()
            .as_array()
            .unwrap();
        doc.get_dictionary(annots[index].as_reference().unwrap())
            .unwrap()
    }

    #[test]
    fn test_widget_kind_mapping() {
        assert_eq!(WidgetKind::from_field_type("date"), WidgetKind::Text);
        assert_eq!(WidgetKind::from_field_type("Checkbox"), WidgetKind::Checkbox);
        assert_eq!(WidgetKind::from_field_type("dropdown"), WidgetKind::Choice);
        assert_eq!(WidgetKind::from_field_type("signature"), WidgetKind::Signature);
        assert_eq!(WidgetKind::from_field_type("radio"), WidgetKind::Text);
    }

    #[test]
    fn test_role_preset_is_case_insensitive() {
        let presets = ChoicePresets::default();
        assert_eq!(presets.options_for("Applicant_ROLE").len(), 4);
        assert_eq!(presets.options_for("Applicant_ROLE")[0], "Designated Executive Broker");
        assert!(presets.options_for("state").is_empty());
    }

    #[test]
    fn test_custom_presets_first_match_wins() {
        let presets = ChoicePresets::empty()
            .with_preset("State", ["NY", "NJ"])
            .with_preset("st", ["x"]);
        assert_eq!(presets.options_for("home_state"), ["NY", "NJ"]);
        assert!(presets.options_for("role").is_empty());
    }

    #[test]
    fn test_pdf_rect_flips_y() {
        let rect = pdf_rect(&position("a", "text", 1), (0.0, 792.0)).unwrap();
        assert_eq!(rect, [100.0, 667.0, 250.0, 692.0]);
    }

    #[test]
    fn test_pdf_rect_rejects_degenerate_box() {
        let mut p = position("a", "text", 1);
        p.width = 0.0;
        assert!(pdf_rect(&p, (0.0, 792.0)).is_none());
        p.width = f64::NAN;
        assert!(pdf_rect(&p, (0.0, 792.0)).is_none());
    }

    #[test]
    fn test_add_widgets_creates_acroform() {
        let mut doc = document_with_pages(1);
        let mut required = position("applicant_name", "text", 1);
        required.required = true;
        let report = FormMaterializer::new()
            .add_widgets(&mut doc, &[required, position("agree", "checkbox", 1)])
            .unwrap();
        assert_eq!(report, MaterializeReport { placed: 2, skipped: 0, failed: 0 });

        let text = widget(&doc, 1, 0);
        assert_eq!(text.get(b"FT").unwrap().as_name().unwrap(), b"Tx");
        assert_eq!(text.get(b"Ff").unwrap().as_i64().unwrap(), 2);

        let checkbox = widget(&doc, 1, 1);
        assert_eq!(checkbox.get(b"V").unwrap().as_name().unwrap(), b"Off");

        let fields = crate::forms::collect_fields(&doc);
        assert_eq!(fields.len(), 2);
        assert!(fields.contains_key("applicant_name"));
    }

    #[test]
    fn test_out_of_range_and_unnamed_positions() {
        let mut doc = document_with_pages(2);
        let positions = vec![
            position("ok", "text", 2),
            position("beyond", "text", 3),
            position("zero", "text", 0),
            position("  ", "text", 1),
        ];
        let report = FormMaterializer::new().add_widgets(&mut doc, &positions).unwrap();
        assert_eq!(report, MaterializeReport { placed: 1, skipped: 2, failed: 1 });
    }

    #[test]
    fn test_dropdown_gets_combo_flag_and_options() {
        let mut doc = document_with_pages(1);
        let mut p = position("broker_role", "dropdown", 1);
        p.required = true;
        FormMaterializer::new().add_widgets(&mut doc, &[p]).unwrap();

        let choice = widget(&doc, 1, 0);
        let flags = choice.get(b"Ff").unwrap().as_i64().unwrap() as u32;
        assert_eq!(flags, (FieldFlags::COMBO | FieldFlags::REQUIRED).bits());
        assert_eq!(choice.get(b"Opt").unwrap().as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_existing_inline_acroform_is_extended() {
        let mut doc = document_with_pages(1);
        let page_id = doc.get_pages()[&1];
        let existing = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Tx",
            "T" => Object::string_literal("Existing"),
            "P" => page_id,
        });
        let root_id = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
        doc.get_object_mut(root_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("AcroForm", dictionary! { "Fields" => vec![Object::from(existing)] });

        FormMaterializer::new()
            .add_widgets(&mut doc, &[position("new_field", "text", 1)])
            .unwrap();

        let fields = crate::forms::collect_fields(&doc);
        let names: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Existing", "new_field"]);
    }

    #[test]
    fn test_pdf_rect_offset_media_box() {
        let rect = pdf_rect(&position("a", "text", 1), (50.0, 892.0)).unwrap();
        assert_eq!(rect, [150.0, 767.0, 300.0, 792.0]);
    }

    #[test]
    fn test_failed_page_attach_leaves_no_orphan() {
        let mut doc = document_with_pages(1);
        let page_id = doc.get_pages()[&1];
        let bogus = doc.add_object(Object::Integer(7));
        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Annots", bogus);
        let objects_before = doc.objects.len();

        let report = FormMaterializer::new()
            .add_widgets(&mut doc, &[position("name", "text", 1)])
            .unwrap();
        assert_eq!(report, MaterializeReport { placed: 0, skipped: 0, failed: 1 });
        assert!(crate::forms::collect_fields(&doc).is_empty());

        // Only the AcroForm and its two default fonts were added
        assert_eq!(doc.objects.len(), objects_before + 3);
    }

    #[test]
    fn test_missing_catalog_fails_before_any_widget() {
        let mut doc = document_with_pages(1);
        doc.trailer.remove(b"Root");
        let objects_before = doc.objects.len();

        let result = FormMaterializer::new().add_widgets(&mut doc, &[position("name", "text", 1)]);
        assert!(result.is_err());
        assert_eq!(doc.objects.len(), objects_before);
    }

    #[test]
    fn test_no_positions_leaves_document_untouched() {
        let mut doc = document_with_pages(1);
        let objects_before = doc.objects.len();
        let report = FormMaterializer::new().add_widgets(&mut doc, &[]).unwrap();
        assert_eq!(report, MaterializeReport::default());
        assert_eq!(doc.objects.len(), objects_before);
    }
}
