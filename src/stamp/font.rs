//! TrueType text font: shaping, measuring and PDF embedding.
//!
//! Stamped text may be Hebrew, Latin or digits, so the font is embedded as
//! a composite (Type0 / CIDFontType2) font with `Identity-H` encoding: each
//! shown glyph is written as its two-byte glyph id. Only the glyphs actually
//! drawn get a `/W` width entry and a `ToUnicode` mapping.

use crate::error::FormError;
use crate::script::visual_order;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use rustybuzz::ttf_parser::GlyphId;
use rustybuzz::{Direction, Face, UnicodeBuffer};
use std::collections::BTreeMap;

/// Measures text for placement. Implemented by [`EmbeddedFont`]; tests use
/// fixed-advance measurers so placements are exact.
pub trait TextMeasure {
    /// Rendered width of `text` at `size` points.
    ///
    /// A character the font cannot draw is a [`FormError::MissingGlyph`]
    /// with an empty `field`; the caller knows which field it was placing.
    fn measure(&self, text: &str, size: f32) -> Result<f32, FormError>;
}

/// One shaped glyph in visual order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapedGlyph {
    pub gid: u16,
    /// Shaped advance in font units.
    pub advance: i32,
    /// Source characters this glyph stands for.
    pub text: String,
}

/// A shaped line of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapedRun {
    pub glyphs: Vec<ShapedGlyph>,
    pub units_per_em: i32,
}

impl ShapedRun {
    pub fn width(&self, size: f32) -> f32 {
        let units: i64 = self.glyphs.iter().map(|g| i64::from(g.advance)).sum();
        units as f32 * size / self.units_per_em.max(1) as f32
    }
}

/// A parsed TrueType font ready to shape and embed.
#[derive(Clone)]
pub struct EmbeddedFont {
    name: String,
    data: Vec<u8>,
}

impl std::fmt::Debug for EmbeddedFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedFont")
            .field("name", &self.name)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl EmbeddedFont {
    /// Validate `data` as a TrueType/OpenType font.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Result<Self, FormError> {
        let name = name.into();
        if Face::from_slice(&data, 0).is_none() {
            return Err(FormError::FontLoadFailed {
                name,
                detail: "not a TrueType/OpenType font".into(),
            });
        }
        Ok(Self { name, data })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn face(&self) -> Result<Face<'_>, FormError> {
        Face::from_slice(&self.data, 0).ok_or_else(|| FormError::FontLoadFailed {
            name: self.name.clone(),
            detail: "font data became unreadable".into(),
        })
    }

    /// Shape `text` into visual-order glyphs.
    ///
    /// Fails on the first character that maps to the missing glyph.
    pub fn shape(&self, text: &str) -> Result<ShapedRun, FormError> {
        let face = self.face()?;
        let visual = visual_order(text);

        let mut buffer = UnicodeBuffer::new();
        buffer.push_str(&visual);
        buffer.set_direction(Direction::LeftToRight);
        let output = rustybuzz::shape(&face, &[], buffer);

        let infos = output.glyph_infos();
        let positions = output.glyph_positions();
        let mut clusters: Vec<usize> = infos.iter().map(|g| g.cluster as usize).collect();
        clusters.push(visual.len());

        let mut glyphs = Vec::with_capacity(infos.len());
        for (i, (info, pos)) in infos.iter().zip(positions).enumerate() {
            let start = clusters[i].min(visual.len());
            let end = clusters[i + 1].min(visual.len()).max(start);
            let source = visual.get(start..end).unwrap_or_default().to_string();
            if info.glyph_id == 0 {
                let ch = visual
                    .get(start..)
                    .and_then(|s| s.chars().next())
                    .unwrap_or(char::REPLACEMENT_CHARACTER);
                return Err(FormError::MissingGlyph {
                    font: self.name.clone(),
                    field: String::new(),
                    ch,
                });
            }
            glyphs.push(ShapedGlyph {
                gid: info.glyph_id as u16,
                advance: pos.x_advance,
                text: source,
            });
        }

        Ok(ShapedRun {
            glyphs,
            units_per_em: face.units_per_em(),
        })
    }

    /// Default advance of `gid` in 1/1000 em, as written to `/W`.
    fn pdf_advance(face: &Face<'_>, gid: u16) -> i64 {
        let upem = face.units_per_em().max(1) as f32;
        let adv = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0);
        (f32::from(adv) * 1000.0 / upem).round() as i64
    }

    /// `TJ` array elements for a run: hex glyph ids interleaved with the
    /// kerning adjustments that make the PDF advance match the shaped one.
    pub fn tj_elements(&self, run: &ShapedRun) -> Result<Vec<Object>, FormError> {
        let face = self.face()?;
        let scale = 1000.0 / run.units_per_em.max(1) as f32;
        let mut elements = Vec::with_capacity(run.glyphs.len() * 2);
        for glyph in &run.glyphs {
            elements.push(Object::String(
                glyph.gid.to_be_bytes().to_vec(),
                lopdf::StringFormat::Hexadecimal,
            ));
            let shaped = (glyph.advance as f32 * scale).round() as i64;
            let adjust = Self::pdf_advance(&face, glyph.gid) - shaped;
            if adjust != 0 {
                elements.push(Object::Integer(adjust));
            }
        }
        Ok(elements)
    }

    /// Add the font program and its Type0 wrapper to `doc`.
    ///
    /// `used` maps every glyph drawn to the text it represents.
    pub fn embed(
        &self,
        doc: &mut Document,
        used: &BTreeMap<u16, String>,
    ) -> Result<ObjectId, FormError> {
        let face = self.face()?;
        let upem = face.units_per_em().max(1) as f32;
        let to_pdf = |v: i16| (f32::from(v) * 1000.0 / upem).round() as i64;
        let base_font = sanitize_font_name(&self.name);

        let mut program = Stream::new(
            dictionary! { "Length1" => self.data.len() as i64 },
            self.data.clone(),
        );
        let _ = program.compress();
        let program_id = doc.add_object(program);

        let bbox = face.global_bounding_box();
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => Object::Name(base_font.clone().into_bytes()),
            "Flags" => 32,
            "FontBBox" => Object::Array(
                [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max]
                    .into_iter()
                    .map(|v| Object::Integer(to_pdf(v)))
                    .collect(),
            ),
            "ItalicAngle" => 0,
            "Ascent" => to_pdf(face.ascender()),
            "Descent" => to_pdf(face.descender()),
            "CapHeight" => to_pdf(face.capital_height().unwrap_or(face.ascender())),
            "StemV" => 80,
            "FontFile2" => program_id,
        });

        let mut widths: Vec<Object> = Vec::with_capacity(used.len() * 2);
        for gid in used.keys() {
            widths.push(Object::Integer(i64::from(*gid)));
            widths.push(Object::Array(vec![Object::Integer(Self::pdf_advance(
                &face, *gid,
            ))]));
        }

        let cid_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => Object::Name(base_font.clone().into_bytes()),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor_id,
            "W" => widths,
            "CIDToGIDMap" => "Identity",
        });

        let mut cmap = Stream::new(Dictionary::new(), to_unicode_cmap(used).into_bytes());
        let _ = cmap.compress();
        let to_unicode_id = doc.add_object(cmap);

        Ok(doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => Object::Name(base_font.into_bytes()),
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(cid_font_id)],
            "ToUnicode" => to_unicode_id,
        }))
    }
}

impl TextMeasure for EmbeddedFont {
    fn measure(&self, text: &str, size: f32) -> Result<f32, FormError> {
        Ok(self.shape(text)?.width(size))
    }
}

fn sanitize_font_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    if cleaned.is_empty() {
        "FormFont".to_string()
    } else {
        cleaned
    }
}

/// Glyph → Unicode CMap so stamped text stays searchable and copyable.
fn to_unicode_cmap(used: &BTreeMap<u16, String>) -> String {
    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    let entries: Vec<(&u16, &String)> = used.iter().filter(|(_, s)| !s.is_empty()).collect();
    for chunk in entries.chunks(100) {
        out.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, text) in chunk {
            let mut utf16 = String::new();
            for unit in text.encode_utf16() {
                utf16.push_str(&format!("{unit:04X}"));
            }
            out.push_str(&format!("<{gid:04X}> <{utf16}>\n"));
        }
        out.push_str("endbfchar\n");
    }

    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::find_system_font;

    #[test]
    fn cmap_lists_used_glyphs() {
        let mut used = BTreeMap::new();
        used.insert(3u16, " ".to_string());
        used.insert(0x1F4, "ש".to_string());
        let cmap = to_unicode_cmap(&used);
        assert!(cmap.contains("2 beginbfchar"));
        assert!(cmap.contains("<0003> <0020>"));
        assert!(cmap.contains("<01F4> <05E9>"));
    }

    #[test]
    fn font_names_are_pdf_safe() {
        assert_eq!(sanitize_font_name("Noto Sans Hebrew"), "Noto-Sans-Hebrew");
        assert_eq!(sanitize_font_name(""), "FormFont");
    }

    #[test]
    fn rejects_non_font_bytes() {
        assert!(matches!(
            EmbeddedFont::from_bytes("junk", b"not a font".to_vec()),
            Err(FormError::FontLoadFailed { .. })
        ));
    }

    #[test]
    fn measures_and_embeds_latin_text() {
        let Some((path, data)) = find_system_font() else {
            eprintln!("SKIP — no system TrueType font found");
            return;
        };
        let font = EmbeddedFont::from_bytes(path.display().to_string(), data).unwrap();

        let narrow = font.measure("ii", 10.0).unwrap();
        let wide = font.measure("WW", 10.0).unwrap();
        assert!(wide > narrow, "W should be wider than i");
        let doubled = font.measure("WW", 20.0).unwrap();
        assert!((doubled - 2.0 * wide).abs() < 0.01, "width scales with size");

        let run = font.shape("4111").unwrap();
        assert_eq!(run.glyphs.len(), 4);
        assert_eq!(run.glyphs[1].gid, run.glyphs[2].gid, "both 1s share a glyph");

        let used: BTreeMap<u16, String> =
            run.glyphs.iter().map(|g| (g.gid, g.text.clone())).collect();
        let mut doc = Document::with_version("1.7");
        let id = font.embed(&mut doc, &used).unwrap();
        let type0 = doc.get_object(id).unwrap().as_dict().unwrap();
        assert_eq!(type0.get(b"Encoding").unwrap().as_name().unwrap(), b"Identity-H");
    }
}
