use crate::assets::{ImageAsset, ImageEncoding};
use crate::canvas::{Command, Document, Page};
use crate::font::FontFace;
use crate::types::{Color, Pt, Rect};
use fixed::types::I32F32;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

const HEADER: &[u8] = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n";

/// Document information dictionary entries.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfInfo {
    pub title: Option<String>,
    pub creator: Option<String>,
    pub producer: String,
}

impl Default for PdfInfo {
    fn default() -> Self {
        Self {
            title: None,
            creator: None,
            producer: format!("danfse {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

pub fn document_to_pdf(document: &Document, info: &PdfInfo) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    document_to_pdf_to_writer(document, info, &mut out)?;
    Ok(out)
}

/// Serializes `document` into `writer`, returning the number of bytes
/// written.
pub fn document_to_pdf_to_writer<W: Write>(
    document: &Document,
    info: &PdfInfo,
    writer: &mut W,
) -> io::Result<usize> {
    let plan = ObjectPlan::new(document);
    let mut offsets = vec![0usize; plan.next_id];
    let mut offset = 0usize;

    write_bytes(writer, HEADER, &mut offset)?;

    write_pdf_object(
        writer,
        &mut offset,
        &mut offsets,
        plan.catalog_id,
        &format!("<< /Type /Catalog /Pages {} 0 R >>", plan.pages_id),
    )?;
    let kids = plan
        .page_ids
        .iter()
        .map(|(page_id, _)| format!("{} 0 R", page_id))
        .collect::<Vec<_>>()
        .join(" ");
    write_pdf_object(
        writer,
        &mut offset,
        &mut offsets,
        plan.pages_id,
        &format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids,
            plan.page_ids.len()
        ),
    )?;

    for (face, id) in &plan.font_ids {
        write_pdf_object(writer, &mut offset, &mut offsets, *id, &font_object(*face))?;
    }

    for (resource_id, asset) in &document.images {
        let Some(ids) = plan.image_ids.get(resource_id) else {
            continue;
        };
        if let (Some(alpha), Some(smask_id)) = (asset.alpha.as_deref(), ids.smask) {
            write_pdf_object(
                writer,
                &mut offset,
                &mut offsets,
                smask_id,
                &image_smask_object(asset, alpha),
            )?;
        }
        write_pdf_object(
            writer,
            &mut offset,
            &mut offsets,
            ids.image,
            &image_object(asset, ids.smask),
        )?;
    }

    let page_height = document.page_size.height;
    for (page, (page_id, content_id)) in document.pages.iter().zip(&plan.page_ids) {
        let (content, used_images) = render_page(page, page_height);
        let page_obj = format!(
            "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources << /Font {} /XObject {} >> /Contents {} 0 R >>",
            plan.pages_id,
            fmt_pt(document.page_size.width),
            fmt_pt(page_height),
            font_resources(&plan.font_ids),
            xobject_resources(&used_images, &plan.image_ids),
            content_id
        );
        write_pdf_object(writer, &mut offset, &mut offsets, *page_id, &page_obj)?;
        write_pdf_object(
            writer,
            &mut offset,
            &mut offsets,
            *content_id,
            &stream_object(&content),
        )?;
    }

    write_pdf_object(
        writer,
        &mut offset,
        &mut offsets,
        plan.info_id,
        &info_object(info),
    )?;

    let xref_start = offset;
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", plan.next_id);
    for entry in offsets.iter().skip(1) {
        xref.push_str(&format!("{:010} 00000 n \n", entry));
    }
    xref.push_str(&format!(
        "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
        plan.next_id, plan.catalog_id, plan.info_id, xref_start
    ));
    write_str(writer, &xref, &mut offset)?;
    writer.flush()?;
    Ok(offset)
}

#[derive(Debug, Clone, Copy)]
struct ImageIds {
    image: usize,
    smask: Option<usize>,
}

/// Object numbering decided up front so every reference is known before the
/// first byte is written.
struct ObjectPlan {
    catalog_id: usize,
    pages_id: usize,
    font_ids: Vec<(FontFace, usize)>,
    image_ids: BTreeMap<String, ImageIds>,
    page_ids: Vec<(usize, usize)>,
    info_id: usize,
    next_id: usize,
}

impl ObjectPlan {
    fn new(document: &Document) -> Self {
        let mut next_id = 1usize;
        let mut alloc = || {
            let id = next_id;
            next_id += 1;
            id
        };
        let catalog_id = alloc();
        let pages_id = alloc();

        let mut faces = document.fonts_used();
        if faces.is_empty() {
            faces.push(FontFace::Regular);
        }
        let font_ids = faces.into_iter().map(|face| (face, alloc())).collect();

        let image_ids = document
            .images
            .iter()
            .map(|(resource_id, asset)| {
                let smask = asset.alpha.as_ref().map(|_| alloc());
                let image = alloc();
                (resource_id.clone(), ImageIds { image, smask })
            })
            .collect();

        let page_ids = document.pages.iter().map(|_| (alloc(), alloc())).collect();
        let info_id = alloc();

        Self {
            catalog_id,
            pages_id,
            font_ids,
            image_ids,
            page_ids,
            info_id,
            next_id,
        }
    }
}

fn render_page(page: &Page, page_height: Pt) -> (String, BTreeSet<String>) {
    let mut out = String::new();
    let mut used_images = BTreeSet::new();
    let mut current_face = FontFace::Regular;
    let mut current_font_size = Pt::from_f32(12.0);

    for cmd in &page.commands {
        match cmd {
            Command::SetFillColor(color) => out.push_str(&color_to_pdf_fill(*color)),
            Command::SetStrokeColor(color) => out.push_str(&color_to_pdf_stroke(*color)),
            Command::SetLineWidth(width) => {
                out.push_str(&format!("{} w\n", fmt_pt(*width)));
            }
            Command::SetFont { face, size } => {
                current_face = *face;
                current_font_size = *size;
            }
            Command::DrawString { x, baseline, text } => {
                let encoded = encode_winansi_pdf_string(text);
                if encoded.replaced > 0 {
                    log::debug!(
                        "{} character(s) outside WinAnsi replaced in {:?}",
                        encoded.replaced,
                        truncate_preview(text, 40)
                    );
                }
                out.push_str("BT\n");
                out.push_str(&format!(
                    "/{} {} Tf\n",
                    current_face.resource(),
                    fmt_pt(current_font_size)
                ));
                out.push_str(&format!(
                    "{} {} Td\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *baseline)
                ));
                out.push_str(&format!("({}) Tj\nET\n", encoded.text));
            }
            Command::Line { x1, y1, x2, y2 } => {
                out.push_str(&format!(
                    "{} {} m\n{} {} l\nS\n",
                    fmt_pt(*x1),
                    fmt_pt(page_height - *y1),
                    fmt_pt(*x2),
                    fmt_pt(page_height - *y2)
                ));
            }
            Command::StrokeRect(rect) => {
                out.push_str(&rect_path(rect, page_height));
                out.push_str("S\n");
            }
            Command::FillRect(rect) => {
                out.push_str(&rect_path(rect, page_height));
                out.push_str("f\n");
            }
            Command::DrawImage { rect, resource_id } => {
                used_images.insert(resource_id.clone());
                out.push_str(&format!(
                    "q\n{} 0 0 {} {} {} cm\n/{} Do\nQ\n",
                    fmt_pt(rect.width),
                    fmt_pt(rect.height),
                    fmt_pt(rect.x),
                    fmt_pt(page_height - rect.bottom()),
                    resource_id
                ));
            }
        }
    }
    (out, used_images)
}

fn rect_path(rect: &Rect, page_height: Pt) -> String {
    format!(
        "{} {} {} {} re\n",
        fmt_pt(rect.x),
        fmt_pt(page_height - rect.bottom()),
        fmt_pt(rect.width),
        fmt_pt(rect.height)
    )
}

fn image_object(asset: &ImageAsset, smask_id: Option<usize>) -> String {
    let stream_data = encode_stream_data(&asset.data);
    let (filters, color_space) = match asset.encoding {
        ImageEncoding::Dct => (
            "[/ASCIIHexDecode /DCTDecode]",
            if asset.gray { "/DeviceGray" } else { "/DeviceRGB" },
        ),
        ImageEncoding::Raw => (
            "/ASCIIHexDecode",
            if asset.gray { "/DeviceGray" } else { "/DeviceRGB" },
        ),
    };
    let smask = smask_id
        .map(|id| format!(" /SMask {} 0 R", id))
        .unwrap_or_default();
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent 8 /Length {} /Filter {}{} >>
stream
{}
endstream",
        asset.width,
        asset.height,
        color_space,
        stream_data.len(),
        filters,
        smask,
        stream_data
    )
}

fn image_smask_object(asset: &ImageAsset, alpha: &[u8]) -> String {
    let stream_data = encode_stream_data(alpha);
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8 /Length {} /Filter /ASCIIHexDecode >>
stream
{}
endstream",
        asset.width,
        asset.height,
        stream_data.len(),
        stream_data
    )
}

fn encode_stream_data(data: &[u8]) -> String {
    let mut hex = ascii_hex_encode(data);
    hex.push('>');
    hex
}

fn ascii_hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2 + data.len() / 32);
    for (index, byte) in data.iter().enumerate() {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02X}", byte);
        if index % 32 == 31 {
            out.push('\n');
        }
    }
    out
}

fn font_object(face: FontFace) -> String {
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        face.base_font()
    )
}

fn font_resources(fonts: &[(FontFace, usize)]) -> String {
    let entries = fonts
        .iter()
        .map(|(face, id)| format!("/{} {} 0 R", face.resource(), id))
        .collect::<Vec<_>>();
    format!("<< {} >>", entries.join(" "))
}

fn xobject_resources(used: &BTreeSet<String>, images: &BTreeMap<String, ImageIds>) -> String {
    let entries = used
        .iter()
        .filter_map(|name| {
            images
                .get(name)
                .map(|ids| format!("/{} {} 0 R", name, ids.image))
        })
        .collect::<Vec<_>>();
    format!("<< {} >>", entries.join(" "))
}

fn stream_object(content: &str) -> String {
    format!(
        "<< /Length {} >>\nstream\n{}\nendstream",
        content.len(),
        content
    )
}

fn info_object(info: &PdfInfo) -> String {
    let mut entries = Vec::new();
    if let Some(title) = info.title.as_deref() {
        entries.push(format!("/Title ({})", encode_winansi_pdf_string(title).text));
    }
    if let Some(creator) = info.creator.as_deref() {
        entries.push(format!(
            "/Creator ({})",
            encode_winansi_pdf_string(creator).text
        ));
    }
    entries.push(format!(
        "/Producer ({})",
        encode_winansi_pdf_string(&info.producer).text
    ));
    format!("<< {} >>", entries.join(" "))
}

fn write_pdf_object<W: Write>(
    writer: &mut W,
    offset: &mut usize,
    offsets: &mut [usize],
    obj_id: usize,
    body: &str,
) -> io::Result<()> {
    if let Some(slot) = offsets.get_mut(obj_id) {
        *slot = *offset;
    }
    write_str(writer, &format!("{} 0 obj\n", obj_id), offset)?;
    write_bytes(writer, body.as_bytes(), offset)?;
    write_bytes(writer, b"\nendobj\n", offset)?;
    Ok(())
}

fn write_bytes<W: Write>(writer: &mut W, data: &[u8], offset: &mut usize) -> io::Result<()> {
    writer.write_all(data)?;
    *offset += data.len();
    Ok(())
}

fn write_str<W: Write>(writer: &mut W, data: &str, offset: &mut usize) -> io::Result<()> {
    write_bytes(writer, data.as_bytes(), offset)
}

struct WinAnsiEncoded {
    text: String,
    replaced: usize,
}

/// Escapes `input` as the body of a PDF literal string in WinAnsi (cp1252).
/// Bytes outside printable ASCII become octal escapes so the content stream
/// stays 7-bit.
fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => {
                replaced += 1;
                b'?'
            }
        };

        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if !(0x20..0x7f).contains(&b) => out.push_str(&format!("\\{:03o}", b)),
            b => out.push(b as char),
        }
    }
    WinAnsiEncoded {
        text: out,
        replaced,
    }
}

fn truncate_preview(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let mut out: String = input.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::from_num(value);
    let scaled = (fixed * I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn color_to_pdf_fill(color: Color) -> String {
    format!(
        "{} {} {} rg\n",
        fmt(color.r.clamp(0.0, 1.0)),
        fmt(color.g.clamp(0.0, 1.0)),
        fmt(color.b.clamp(0.0, 1.0))
    )
}

fn color_to_pdf_stroke(color: Color) -> String {
    format!(
        "{} {} {} RG\n",
        fmt(color.r.clamp(0.0, 1.0)),
        fmt(color.g.clamp(0.0, 1.0)),
        fmt(color.b.clamp(0.0, 1.0))
    )
}
