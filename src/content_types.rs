//! `[Content_Types].xml` parsing and maintenance.

use crate::container::canonical_part_name;
use crate::error::Result;
use crate::xml::{self, NS_CONTENT_TYPES};
use quick_xml::events::{BytesEnd, BytesStart, Event};

pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

pub(crate) const CT_WORKBOOK: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
pub(crate) const CT_WORKBOOK_MACRO: &str = "application/vnd.ms-excel.sheet.macroEnabled.main+xml";
pub(crate) const CT_WORKBOOK_TEMPLATE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.template.main+xml";
pub(crate) const CT_WORKSHEET: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
pub(crate) const CT_STYLES: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";
pub(crate) const CT_SHARED_STRINGS: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
pub(crate) const CT_RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";

/// Default and override content types, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    /// Content types for a freshly generated package.
    pub fn minimal() -> Self {
        let mut ct = Self::default();
        ct.defaults.push(("rels".to_string(), CT_RELATIONSHIPS.to_string()));
        ct.defaults.push(("xml".to_string(), "application/xml".to_string()));
        ct
    }

    /// Parse `[Content_Types].xml`.
    pub fn parse(content: &str) -> Result<Self> {
        let mut ct = Self::default();
        let mut reader = xml::reader_from_str(content);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match xml::read_event(&mut reader, &mut buf, CONTENT_TYPES_PART)? {
                Event::Empty(e) | Event::Start(e) => match e.local_name().as_ref() {
                    b"Default" => {
                        if let (Some(ext), Some(ty)) =
                            (xml::attr(&e, b"Extension"), xml::attr(&e, b"ContentType"))
                        {
                            ct.defaults.push((ext, ty));
                        }
                    }
                    b"Override" => {
                        if let (Some(part), Some(ty)) =
                            (xml::attr(&e, b"PartName"), xml::attr(&e, b"ContentType"))
                        {
                            ct.overrides.push((part, ty));
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(ct)
    }

    /// Serialize, keeping entry order.
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut w = xml::writer(Vec::new(), false);
        xml::write_decl(&mut w)?;
        w.write_event(Event::Start(
            BytesStart::new("Types").with_attributes([("xmlns", NS_CONTENT_TYPES)]),
        ))?;
        for (ext, ty) in &self.defaults {
            w.write_event(Event::Empty(BytesStart::new("Default").with_attributes([
                ("Extension", ext.as_str()),
                ("ContentType", ty.as_str()),
            ])))?;
        }
        for (part, ty) in &self.overrides {
            w.write_event(Event::Empty(BytesStart::new("Override").with_attributes([
                ("PartName", part.as_str()),
                ("ContentType", ty.as_str()),
            ])))?;
        }
        w.write_event(Event::End(BytesEnd::new("Types")))?;
        Ok(w.into_inner())
    }

    /// Content type of a part: its override, else the default for its extension.
    pub fn content_type_of(&self, part: &str) -> Option<&str> {
        let canonical = canonical_part_name(part);
        if let Some((_, ty)) = self
            .overrides
            .iter()
            .find(|(p, _)| canonical_part_name(p).eq_ignore_ascii_case(&canonical))
        {
            return Some(ty);
        }
        let ext = canonical.rsplit_once('.').map(|(_, e)| e)?;
        self.defaults
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(ext))
            .map(|(_, ty)| ty.as_str())
    }

    /// Whether any override carries `content_type`.
    pub fn has_override_type(&self, content_type: &str) -> bool {
        self.overrides.iter().any(|(_, ty)| ty == content_type)
    }

    /// Add or replace the override for a part.
    pub fn set_override(&mut self, part: &str, content_type: &str) {
        let name = format!("/{}", canonical_part_name(part));
        match self
            .overrides
            .iter_mut()
            .find(|(p, _)| p.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = content_type.to_string(),
            None => self.overrides.push((name, content_type.to_string())),
        }
    }

    /// Remove the override for a part. Returns whether one existed.
    pub fn remove_override(&mut self, part: &str) -> bool {
        let canonical = canonical_part_name(part);
        let before = self.overrides.len();
        self.overrides
            .retain(|(p, _)| !canonical_part_name(p).eq_ignore_ascii_case(&canonical));
        before != self.overrides.len()
    }

    /// Add a default for an extension if none exists.
    pub fn ensure_default(&mut self, ext: &str, content_type: &str) {
        if !self.defaults.iter().any(|(e, _)| e.eq_ignore_ascii_case(ext)) {
            self.defaults.push((ext.to_string(), content_type.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/></Types>"#;

    #[test]
    fn test_parse_and_lookup() {
        let ct = ContentTypes::parse(SAMPLE).unwrap();
        assert_eq!(ct.content_type_of("xl/workbook.xml"), Some(CT_WORKBOOK));
        assert_eq!(ct.content_type_of("/xl/worksheets/sheet1.xml"), Some(CT_WORKSHEET));
        assert_eq!(ct.content_type_of("xl/media/image1.PNG"), Some("image/png"));
        assert_eq!(ct.content_type_of("xl/theme/theme1.xml"), Some("application/xml"));
        assert!(ct.has_override_type(CT_WORKBOOK));
    }

    #[test]
    fn test_override_maintenance() {
        let mut ct = ContentTypes::parse(SAMPLE).unwrap();
        assert!(ct.remove_override("xl/calcChain.xml"));
        assert!(!ct.remove_override("xl/calcChain.xml"));
        ct.set_override("xl/worksheets/sheet2.xml", CT_WORKSHEET);
        ct.set_override("xl/sharedStrings.xml", CT_SHARED_STRINGS);

        let reparsed =
            ContentTypes::parse(&String::from_utf8(ct.to_xml().unwrap()).unwrap()).unwrap();
        assert_eq!(reparsed, ct);
        assert_eq!(
            reparsed.content_type_of("xl/worksheets/sheet2.xml"),
            Some(CT_WORKSHEET)
        );
        assert_eq!(
            reparsed.content_type_of("xl/calcChain.xml"),
            Some("application/xml")
        );
    }
}
