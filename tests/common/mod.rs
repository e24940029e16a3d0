//! In-memory workbook fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const CT_BASE: &str = "application/vnd.openxmlformats-officedocument";

pub const SHEET1: &str = "xl/worksheets/sheet1.xml";
pub const SHEET2: &str = "xl/worksheets/sheet2.xml";
pub const SHEET3: &str = "xl/worksheets/sheet3.xml";
pub const WORKBOOK: &str = "xl/workbook.xml";
pub const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
pub const STYLES: &str = "xl/styles.xml";
pub const THEME: &str = "xl/theme/theme1.xml";
pub const CALC_CHAIN: &str = "xl/calcChain.xml";
pub const CONTENT_TYPES: &str = "[Content_Types].xml";

/// Fixture builder: three sheets `Alpha`, `Beta` and `Gamma`, a shared string table,
/// a styles part, a theme, a calculation chain and document properties.
///
/// - Alpha: `A1="Name"` (shared), `B1=10`, `A2="Total"` (shared, bold), `B2=SUM(B1:B1)`
/// - Beta: `A1="Beta"` (shared), `B1` a date serial
/// - Gamma: `gamma_rows` rows of `A=n`, `B="row n"` (inline), `C=2n`
pub struct Fixture {
    pub gamma_rows: u32,
    pub extra_entries: Vec<(String, Vec<u8>)>,
    pub replaced: HashMap<String, String>,
    pub omitted: HashSet<String>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            gamma_rows: 5,
            extra_entries: Vec::new(),
            replaced: HashMap::new(),
            omitted: HashSet::new(),
        }
    }
}

impl Fixture {
    pub fn with_gamma_rows(mut self, rows: u32) -> Self {
        self.gamma_rows = rows;
        self
    }

    pub fn with_entry(mut self, name: &str, bytes: &[u8]) -> Self {
        self.extra_entries.push((name.to_string(), bytes.to_vec()));
        self
    }

    /// Replace one of the standard parts.
    pub fn with_part(mut self, name: &str, body: &str) -> Self {
        self.replaced.insert(name.to_string(), body.to_string());
        self
    }

    /// Leave one of the standard parts out.
    pub fn without(mut self, name: &str) -> Self {
        self.omitted.insert(name.to_string());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let replaced = &self.replaced;
        let omitted = &self.omitted;
        let mut put = |name: &str, body: &[u8]| {
            if omitted.contains(name) {
                return;
            }
            let body = replaced.get(name).map_or(body, |b| b.as_bytes());
            zip.start_file(name, deflated).unwrap();
            zip.write_all(body).unwrap();
        };

        put(CONTENT_TYPES, content_types().as_bytes());
        put("_rels/.rels", package_rels().as_bytes());
        put("docProps/app.xml", APP_XML.as_bytes());
        put(WORKBOOK, workbook_xml().as_bytes());
        put("xl/_rels/workbook.xml.rels", workbook_rels().as_bytes());
        put(SHEET1, sheet1().as_bytes());
        put(SHEET2, sheet2().as_bytes());
        put(SHEET3, gamma(self.gamma_rows).as_bytes());
        put(THEME, THEME_XML.as_bytes());
        put(STYLES, STYLES_XML.as_bytes());
        put(SHARED_STRINGS, shared_strings().as_bytes());
        put(CALC_CHAIN, calc_chain().as_bytes());
        for (name, body) in &self.extra_entries {
            put(name, body);
        }
        zip.finish().unwrap().into_inner()
    }

    /// Write the fixture into `dir` and return its path.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

/// Default three-sheet fixture.
pub fn fixture() -> Vec<u8> {
    Fixture::default().build()
}

/// Decompressed bytes of one entry, if present.
pub fn entry(xlsx: &[u8], name: &str) -> Option<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(xlsx)).unwrap();
    let mut file = archive.by_name(name).ok()?;
    let mut out = Vec::new();
    file.read_to_end(&mut out).unwrap();
    Some(out)
}

/// One entry as text; panics when missing.
pub fn entry_text(xlsx: &[u8], name: &str) -> String {
    let bytes = entry(xlsx, name).unwrap_or_else(|| panic!("missing entry {name}"));
    String::from_utf8(bytes).unwrap()
}

/// Entry names in archive order.
pub fn entry_names(xlsx: &[u8]) -> Vec<String> {
    let mut archive = ZipArchive::new(Cursor::new(xlsx)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index_raw(i).unwrap().name().to_string())
        .collect()
}

fn content_types() -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    xml.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
    xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
    let overrides = [
        ("/xl/workbook.xml", "spreadsheetml.sheet.main+xml"),
        ("/xl/worksheets/sheet1.xml", "spreadsheetml.worksheet+xml"),
        ("/xl/worksheets/sheet2.xml", "spreadsheetml.worksheet+xml"),
        ("/xl/worksheets/sheet3.xml", "spreadsheetml.worksheet+xml"),
        ("/xl/theme/theme1.xml", "theme+xml"),
        ("/xl/styles.xml", "spreadsheetml.styles+xml"),
        ("/xl/sharedStrings.xml", "spreadsheetml.sharedStrings+xml"),
        ("/xl/calcChain.xml", "spreadsheetml.calcChain+xml"),
        ("/docProps/app.xml", "extended-properties+xml"),
    ];
    for (part, kind) in overrides {
        xml.push_str(&format!(r#"<Override PartName="{part}" ContentType="{CT_BASE}.{kind}"/>"#));
    }
    xml.push_str("</Types>");
    xml
}

fn rels(items: &[(&str, &str, &str)]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
    for (id, kind, target) in items {
        xml.push_str(&format!(
            r#"<Relationship Id="{id}" Type="{REL_BASE}/{kind}" Target="{target}"/>"#
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

fn package_rels() -> String {
    rels(&[
        ("rId1", "officeDocument", "xl/workbook.xml"),
        ("rId2", "extended-properties", "docProps/app.xml"),
    ])
}

fn workbook_rels() -> String {
    rels(&[
        ("rId1", "worksheet", "worksheets/sheet1.xml"),
        ("rId2", "worksheet", "worksheets/sheet2.xml"),
        ("rId3", "worksheet", "worksheets/sheet3.xml"),
        ("rId4", "theme", "theme/theme1.xml"),
        ("rId5", "styles", "styles.xml"),
        ("rId6", "sharedStrings", "sharedStrings.xml"),
        ("rId7", "calcChain", "calcChain.xml"),
    ])
}

fn workbook_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="{NS_MAIN}" xmlns:r="{NS_REL}"><fileVersion appName="xl"/><bookViews><workbookView xWindow="0" yWindow="0" windowWidth="16000" windowHeight="9000"/></bookViews><sheets><sheet name="Alpha" sheetId="1" r:id="rId1"/><sheet name="Beta" sheetId="2" r:id="rId2"/><sheet name="Gamma" sheetId="3" r:id="rId3"/></sheets><calcPr calcId="191029"/></workbook>"#
    )
}

fn worksheet(dimension: &str, selected: bool, rows: &str) -> String {
    let tab = if selected { r#" tabSelected="1""# } else { "" };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="{NS_MAIN}" xmlns:r="{NS_REL}"><dimension ref="{dimension}"/><sheetViews><sheetView{tab} workbookViewId="0"/></sheetViews><sheetFormatPr defaultRowHeight="15"/><sheetData>{rows}</sheetData><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#
    )
}

fn sheet1() -> String {
    worksheet(
        "A1:B2",
        true,
        r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1"><v>10</v></c></row><row r="2"><c r="A2" s="2" t="s"><v>1</v></c><c r="B2"><f>SUM(B1:B1)</f><v>10</v></c></row>"#,
    )
}

fn sheet2() -> String {
    worksheet(
        "A1:B1",
        false,
        r#"<row r="1"><c r="A1" t="s"><v>2</v></c><c r="B1" s="1"><v>45000</v></c></row>"#,
    )
}

fn gamma(rows: u32) -> String {
    let mut body = String::new();
    for r in 1..=rows {
        body.push_str(&format!(
            r#"<row r="{r}"><c r="A{r}"><v>{r}</v></c><c r="B{r}" t="inlineStr"><is><t>row {r}</t></is></c><c r="C{r}"><v>{}</v></c></row>"#,
            r * 2
        ));
    }
    let dimension = if rows == 0 {
        "A1".to_string()
    } else {
        format!("A1:C{rows}")
    };
    worksheet(&dimension, false, &body)
}

fn shared_strings() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><sst xmlns="{NS_MAIN}" count="3" uniqueCount="3"><si><t>Name</t></si><si><t>Total</t></si><si><t>Beta</t></si></sst>"#
    )
}

fn calc_chain() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><calcChain xmlns="{NS_MAIN}"><c r="B2" i="1"/></calcChain>"#
    )
}

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy\-mm\-dd"/></numFmts>
<fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts>
<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>
<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
<cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="164" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs>
<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>
</styleSheet>"#;

const THEME_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme"><a:themeElements><a:clrScheme name="Office"><a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1></a:clrScheme></a:themeElements></a:theme>"#;

const APP_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties"><Application>Microsoft Excel</Application></Properties>"#;
