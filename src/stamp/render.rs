//! Draw a [`StampPlan`] onto a fresh copy of the template.
//!
//! The template's own content is wrapped in `q … Q` and the stamped content
//! is appended as a separate stream, so whatever graphics state the template
//! leaves behind cannot shift the stamped fields.

use super::font::EmbeddedFont;
use super::grid::grid_operations;
use super::plan::{Placement, StampPlan};
use crate::error::FormError;
use crate::signature::{ImageFormat, SignatureImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use tracing::debug;

/// Opacity signatures are drawn with, so form lines stay visible underneath.
pub const SIGNATURE_OPACITY: f32 = 0.8;

const TEXT_FONT: &str = "FmText";
const GRID_FONT: &str = "FmGrid";
const SIGNATURE_STATE: &str = "FmSigGS";

/// A4 in points, used when a page carries no `MediaBox`.
const A4: (f32, f32) = (595.28, 841.89);

fn pdf_err(e: lopdf::Error) -> FormError {
    FormError::PdfWriteFailed {
        detail: e.to_string(),
    }
}

/// Stamp `plan` onto `template` and return the serialised PDF.
pub fn render(template: &[u8], plan: &StampPlan, font: &EmbeddedFont) -> Result<Vec<u8>, FormError> {
    let mut doc = Document::load_mem(template).map_err(|e| FormError::CorruptTemplate {
        detail: e.to_string(),
    })?;
    let pages = doc.get_pages();
    let page_id = *pages.get(&plan.page).ok_or(FormError::MissingPage {
        page: plan.page,
        total: pages.len(),
    })?;
    inherit_resources(&mut doc, page_id)?;

    let mut ops = vec![Operation::new("q", vec![])];
    let mut used_glyphs: BTreeMap<u16, String> = BTreeMap::new();
    let mut image_count = 0usize;

    for placement in &plan.placements {
        match placement {
            Placement::Text {
                block,
                field,
                text,
                x,
                y,
                size,
                ..
            } => {
                let run = font.shape(text).map_err(|e| match e {
                    FormError::MissingGlyph { font, ch, .. } => FormError::MissingGlyph {
                        font,
                        field: format!("{block}.{field}"),
                        ch,
                    },
                    other => other,
                })?;
                for glyph in &run.glyphs {
                    used_glyphs
                        .entry(glyph.gid)
                        .or_insert_with(|| glyph.text.clone());
                }
                ops.extend([
                    Operation::new("BT", vec![]),
                    Operation::new("g", vec![0.into()]),
                    Operation::new("Tf", vec![TEXT_FONT.into(), (*size).into()]),
                    Operation::new("Td", vec![(*x).into(), (*y).into()]),
                    Operation::new("TJ", vec![Object::Array(font.tj_elements(&run)?)]),
                    Operation::new("ET", vec![]),
                ]);
            }
            Placement::Image {
                image,
                x,
                y,
                width,
                height,
                ..
            } => {
                let xobject_id = image_xobject(&mut doc, image)?;
                let name = format!("FmSig{image_count}");
                image_count += 1;
                register_resource(&mut doc, page_id, b"XObject", &name, xobject_id)?;
                ops.extend([
                    Operation::new("q", vec![]),
                    Operation::new("gs", vec![SIGNATURE_STATE.into()]),
                    Operation::new(
                        "cm",
                        vec![
                            (*width).into(),
                            0.into(),
                            0.into(),
                            (*height).into(),
                            (*x).into(),
                            (*y).into(),
                        ],
                    ),
                    Operation::new("Do", vec![name.as_str().into()]),
                    Operation::new("Q", vec![]),
                ]);
            }
        }
    }

    if !used_glyphs.is_empty() {
        let font_id = font.embed(&mut doc, &used_glyphs)?;
        register_resource(&mut doc, page_id, b"Font", TEXT_FONT, font_id)?;
    }
    if image_count > 0 {
        let state_id = doc.add_object(dictionary! {
            "Type" => "ExtGState",
            "CA" => SIGNATURE_OPACITY,
            "ca" => SIGNATURE_OPACITY,
        });
        register_resource(&mut doc, page_id, b"ExtGState", SIGNATURE_STATE, state_id)?;
    }
    if plan.grid {
        let grid_font = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        register_resource(&mut doc, page_id, b"Font", GRID_FONT, grid_font)?;
        let (width, height) = page_size(&doc, page_id);
        ops.extend(grid_operations(width, height, GRID_FONT));
    }
    ops.push(Operation::new("Q", vec![]));

    let content = Content { operations: ops }.encode().map_err(pdf_err)?;
    append_isolated_content(&mut doc, page_id, content)?;

    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(|e| FormError::PdfWriteFailed {
        detail: e.to_string(),
    })?;
    debug!(
        "Rendered {} placements ({} glyphs, {} images) → {} bytes",
        plan.placements.len(),
        used_glyphs.len(),
        image_count,
        out.len()
    );
    Ok(out)
}

/// Copy inherited `Resources` onto the page so additions do not hide them.
fn inherit_resources(doc: &mut Document, page_id: ObjectId) -> Result<(), FormError> {
    let page = doc.get_dictionary(page_id).map_err(pdf_err)?;
    if page.has(b"Resources") {
        return Ok(());
    }
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut inherited = Dictionary::new();
    while let Some(node_id) = parent {
        let node = doc.get_dictionary(node_id).map_err(pdf_err)?;
        if let Ok(resources) = node.get(b"Resources") {
            inherited = match resources {
                Object::Reference(id) => doc.get_dictionary(*id).map_err(pdf_err)?.clone(),
                Object::Dictionary(dict) => dict.clone(),
                _ => Dictionary::new(),
            };
            break;
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(pdf_err)?
        .set("Resources", inherited);
    Ok(())
}

/// Add `name → id` to the page's resource `category` (`Font`, `XObject`, …),
/// following indirect references the template may use.
fn register_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &[u8],
    name: &str,
    id: ObjectId,
) -> Result<(), FormError> {
    let resources_ref = {
        let page = doc.get_dictionary(page_id).map_err(pdf_err)?;
        match page.get(b"Resources") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        }
    };
    let category_ref = {
        let resources = match resources_ref {
            Some(res_id) => doc.get_object_mut(res_id),
            None => doc.get_or_create_resources(page_id),
        }
        .and_then(Object::as_dict_mut)
        .map_err(pdf_err)?;
        match resources.get(category) {
            Ok(Object::Reference(id)) => Some(*id),
            Ok(Object::Dictionary(_)) => None,
            _ => {
                resources.set(category.to_vec(), Dictionary::new());
                None
            }
        }
    };

    let entries = match (category_ref, resources_ref) {
        (Some(cat_id), _) => doc.get_object_mut(cat_id),
        (None, Some(res_id)) => doc
            .get_object_mut(res_id)
            .and_then(Object::as_dict_mut)
            .and_then(|res| res.get_mut(category)),
        (None, None) => doc
            .get_or_create_resources(page_id)
            .and_then(Object::as_dict_mut)
            .and_then(|res| res.get_mut(category)),
    }
    .and_then(Object::as_dict_mut)
    .map_err(pdf_err)?;
    entries.set(name, Object::Reference(id));
    Ok(())
}

/// Wrap the existing page content in `q … Q` and append `content` after it.
fn append_isolated_content(
    doc: &mut Document,
    page_id: ObjectId,
    content: Vec<u8>,
) -> Result<(), FormError> {
    let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let mut body = b"Q\n".to_vec();
    body.extend(content);
    let mut stream = Stream::new(Dictionary::new(), body);
    let _ = stream.compress();
    let stamp_id = doc.add_object(stream);

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(pdf_err)?;
    let mut contents: Vec<Object> = match page.get(b"Contents") {
        Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    contents.insert(0, Object::Reference(save_id));
    contents.push(Object::Reference(stamp_id));
    page.set("Contents", contents);
    Ok(())
}

/// Page width and height from the (possibly inherited) `MediaBox`.
fn page_size(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let mut node = Some(page_id);
    while let Some(id) = node {
        let Ok(dict) = doc.get_dictionary(id) else {
            break;
        };
        if let Ok(Object::Array(mbox)) = dict.get(b"MediaBox") {
            let nums: Vec<f32> = mbox.iter().filter_map(|o| o.as_float().ok()).collect();
            if let [x0, y0, x1, y1] = nums[..] {
                return ((x1 - x0).abs(), (y1 - y0).abs());
            }
        }
        node = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    A4
}

/// Build an image XObject: JPEG passes through as `DCTDecode`, PNG is
/// decoded to RGB with its alpha channel as a soft mask.
fn image_xobject(doc: &mut Document, image: &SignatureImage) -> Result<ObjectId, FormError> {
    match image.format()? {
        ImageFormat::Jpeg => {
            let decoded =
                image::load_from_memory_with_format(image.bytes(), image::ImageFormat::Jpeg)
                    .map_err(|e| FormError::UnsupportedImage {
                        detail: format!("cannot decode image/jpeg: {e}"),
                    })?;
            let color_space = if decoded.color().has_color() {
                "DeviceRGB"
            } else {
                "DeviceGray"
            };
            Ok(doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => decoded.width(),
                    "Height" => decoded.height(),
                    "ColorSpace" => color_space,
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                image.bytes().to_vec(),
            )))
        }
        ImageFormat::Png => {
            let rgba = image.decode()?;
            let (width, height) = rgba.dimensions();
            let mut rgb = Vec::with_capacity((width * height * 3) as usize);
            let mut alpha = Vec::with_capacity((width * height) as usize);
            for pixel in rgba.pixels() {
                rgb.extend_from_slice(&pixel.0[..3]);
                alpha.push(pixel.0[3]);
            }

            let mut mask = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width,
                    "Height" => height,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                alpha,
            );
            let _ = mask.compress();
            let mask_id = doc.add_object(mask);

            let mut stream = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width,
                    "Height" => height,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "SMask" => mask_id,
                },
                rgb,
            );
            let _ = stream.compress();
            Ok(doc.add_object(stream))
        }
    }
}
