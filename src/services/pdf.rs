//! Deterministic single-page PDF layout for a submission payload. The
//! vertical cursor only moves down; every drawing primitive returns the
//! next usable Y so sections never overlap. Content is assumed to fit one
//! A4 page; there is no pagination.

use std::io::Cursor;

use anyhow::Context;
use base64::Engine;
use chrono::NaiveDate;
use image::{DynamicImage, ImageFormat};
use lopdf::{
    content::{Content, Operation},
    dictionary, Dictionary, Document, Object, Stream,
};
use tracing::warn;

use crate::{
    config::InstitutionConfig,
    models::application::{StudentPhoto, SubmissionPayload},
    services::payload::format_date,
};

const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
const MARGIN: f32 = 48.0;
const LINE_HEIGHT: f32 = 14.0;
const PHOTO_BOX_WIDTH: f32 = 150.0;
const PHOTO_BOX_HEIGHT: f32 = 190.0;
const COLUMN_GAP: f32 = 16.0;

type Rgb = [u8; 3];

const PRIMARY: Rgb = [255, 106, 0];
const PRIMARY_LIGHT: Rgb = [255, 237, 213];
const PRIMARY_DARK: Rgb = [124, 45, 18];
const INK: Rgb = [17, 24, 39];
const SLATE: Rgb = [100, 116, 139];
const LINE: Rgb = [226, 232, 240];
const SURFACE: Rgb = [248, 250, 252];
const WHITE: Rgb = [255, 255, 255];

#[derive(Clone, Copy)]
enum FontStyle {
    Normal,
    Bold,
}

impl FontStyle {
    fn resource_name(self) -> &'static str {
        match self {
            FontStyle::Normal => "F1",
            FontStyle::Bold => "F2",
        }
    }
}

/// How the student photo resolved during rendering. Fetch and decode
/// failures degrade to a placeholder; they never abort the document.
enum PhotoArt {
    Ready(DynamicImage),
    Missing,
    Failed,
}

/// Collects content-stream operations and image XObjects; coordinates are
/// top-down and flipped to PDF space at draw time.
struct Canvas {
    ops: Vec<Operation>,
    images: Vec<Stream>,
}

impl Canvas {
    fn new() -> Self {
        Self { ops: Vec::new(), images: Vec::new() }
    }

    fn color_operands(color: Rgb) -> Vec<Object> {
        color.iter().map(|&c| (c as f32 / 255.0).into()).collect()
    }

    fn set_fill(&mut self, color: Rgb) {
        self.ops.push(Operation::new("rg", Self::color_operands(color)));
    }

    fn set_stroke(&mut self, color: Rgb) {
        self.ops.push(Operation::new("RG", Self::color_operands(color)));
    }

    fn set_line_width(&mut self, width: f32) {
        self.ops.push(Operation::new("w", vec![width.into()]));
    }

    fn rect_ops(&mut self, x: f32, y_top: f32, w: f32, h: f32, paint: &str) {
        let y = PAGE_HEIGHT - y_top - h;
        self.ops.push(Operation::new(
            "re",
            vec![x.into(), y.into(), w.into(), h.into()],
        ));
        self.ops.push(Operation::new(paint, vec![]));
    }

    fn fill_rect(&mut self, x: f32, y_top: f32, w: f32, h: f32) {
        self.rect_ops(x, y_top, w, h, "f");
    }

    fn stroke_rect(&mut self, x: f32, y_top: f32, w: f32, h: f32) {
        self.rect_ops(x, y_top, w, h, "S");
    }

    fn fill_stroke_rect(&mut self, x: f32, y_top: f32, w: f32, h: f32) {
        self.rect_ops(x, y_top, w, h, "B");
    }

    fn hline(&mut self, x1: f32, x2: f32, y_top: f32) {
        let y = PAGE_HEIGHT - y_top;
        self.ops.push(Operation::new("m", vec![x1.into(), y.into()]));
        self.ops.push(Operation::new("l", vec![x2.into(), y.into()]));
        self.ops.push(Operation::new("S", vec![]));
    }

    /// Draws one line of text with its baseline at `y_top` from the top of
    /// the page.
    fn text(&mut self, content: &str, x: f32, y_top: f32, style: FontStyle, size: f32, color: Rgb) {
        self.set_fill(color);
        self.ops.push(Operation::new("BT", vec![]));
        self.ops.push(Operation::new(
            "Tf",
            vec![style.resource_name().into(), size.into()],
        ));
        self.ops.push(Operation::new(
            "Td",
            vec![x.into(), (PAGE_HEIGHT - y_top).into()],
        ));
        self.ops
            .push(Operation::new("Tj", vec![Object::string_literal(content)]));
        self.ops.push(Operation::new("ET", vec![]));
    }

    /// Registers an RGB image as a DCTDecode XObject and draws it into the
    /// given box (top-down coordinates).
    fn image(
        &mut self,
        img: &DynamicImage,
        x: f32,
        y_top: f32,
        width: f32,
        height: f32,
    ) -> anyhow::Result<()> {
        let rgb = img.to_rgb8();
        let (px_w, px_h) = (rgb.width(), rgb.height());
        let mut jpeg = Vec::new();
        DynamicImage::ImageRgb8(rgb)
            .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .context("jpeg encode for pdf embed")?;

        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => px_w as i64,
                "Height" => px_h as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        );
        let name = format!("Im{}", self.images.len());
        self.images.push(stream);

        let y = PAGE_HEIGHT - y_top - height;
        self.ops.push(Operation::new("q", vec![]));
        self.ops.push(Operation::new(
            "cm",
            vec![
                width.into(),
                0f32.into(),
                0f32.into(),
                height.into(),
                x.into(),
                y.into(),
            ],
        ));
        self.ops.push(Operation::new("Do", vec![name.into()]));
        self.ops.push(Operation::new("Q", vec![]));
        Ok(())
    }
}

/// Approximate Helvetica advance width in ems. Close enough for wrapping;
/// exactness does not matter as long as it is deterministic.
fn char_width_factor(c: char) -> f32 {
    match c {
        'i' | 'j' | 'l' | '\'' | '’' | '.' | ',' | ':' | ';' | '!' | '|' => 0.28,
        'f' | 't' | 'r' | 'I' | '(' | ')' | '[' | ']' | '-' | '/' | ' ' => 0.35,
        'm' | 'w' | 'M' | 'W' | '@' | '&' => 0.89,
        'A'..='Z' => 0.68,
        '0'..='9' => 0.556,
        _ => 0.52,
    }
}

fn text_width(text: &str, size: f32) -> f32 {
    text.chars().map(char_width_factor).sum::<f32>() * size
}

/// Greedy word wrap against the approximate width table. Explicit newlines
/// are respected; a single word wider than the column gets its own line.
fn split_to_width(text: &str, width: f32, size: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for raw_line in text.split('\n') {
        let mut current = String::new();
        for word in raw_line.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if text_width(&candidate, size) <= width || current.is_empty() {
                current = candidate;
            } else {
                lines.push(current);
                current = word.to_string();
            }
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn display_value(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() { "N/A" } else { trimmed }
}

/// One label/value row: small bold label, wrapped value, divider line.
/// Returns the next usable Y. Absent values render "N/A"; rows are never
/// skipped so the printed form stays visually consistent.
fn render_field(canvas: &mut Canvas, label: &str, value: &str, x: f32, y: f32, width: f32) -> f32 {
    canvas.text(&label.to_uppercase(), x, y, FontStyle::Bold, 8.0, SLATE);

    let value_y = y + 10.0;
    let wrapped = split_to_width(display_value(value), width, 11.0);
    for (i, line) in wrapped.iter().enumerate() {
        canvas.text(line, x, value_y + i as f32 * LINE_HEIGHT, FontStyle::Normal, 11.0, INK);
    }

    let mut next_y = value_y + (wrapped.len() - 1) as f32 * LINE_HEIGHT + 10.0;
    canvas.set_stroke(LINE);
    canvas.set_line_width(0.5);
    canvas.hline(x, x + width, next_y);
    next_y += 10.0;
    next_y
}

fn draw_header(canvas: &mut Canvas, config: &InstitutionConfig, date_text: &str) -> f32 {
    canvas.set_fill(PRIMARY);
    canvas.fill_rect(0.0, 0.0, PAGE_WIDTH, 82.0);
    canvas.text(&config.name, MARGIN, 32.0, FontStyle::Bold, 18.0, WHITE);
    canvas.text(&config.subtitle, MARGIN, 50.0, FontStyle::Normal, 10.0, WHITE);
    canvas.text(&config.tagline, MARGIN, 66.0, FontStyle::Normal, 9.0, WHITE);
    let date_x = PAGE_WIDTH - MARGIN - text_width(date_text, 9.0);
    canvas.text(date_text, date_x, 32.0, FontStyle::Normal, 9.0, WHITE);
    98.0
}

fn draw_section_header(canvas: &mut Canvas, title: &str, x: f32, y: f32, width: f32) -> f32 {
    canvas.set_fill(PRIMARY_LIGHT);
    canvas.set_stroke(PRIMARY);
    canvas.set_line_width(0.6);
    canvas.fill_stroke_rect(x, y, width, 20.0);
    canvas.text(title, x + 8.0, y + 14.0, FontStyle::Bold, 11.0, PRIMARY_DARK);
    y + 28.0
}

fn render_student_photo(canvas: &mut Canvas, art: &PhotoArt, x: f32, y: f32) -> f32 {
    canvas.text("STUDENT PHOTO", x, y, FontStyle::Bold, 8.0, SLATE);
    let box_y = y + 10.0;
    canvas.set_stroke(LINE);
    canvas.set_line_width(0.8);
    canvas.stroke_rect(x, box_y, PHOTO_BOX_WIDTH, PHOTO_BOX_HEIGHT);

    match art {
        PhotoArt::Ready(img) => {
            let (iw, ih) = (img.width() as f32, img.height() as f32);
            let scale = (PHOTO_BOX_WIDTH / iw).min(PHOTO_BOX_HEIGHT / ih);
            let draw_w = iw * scale;
            let draw_h = ih * scale;
            let img_x = x + (PHOTO_BOX_WIDTH - draw_w) / 2.0;
            let img_y = box_y + (PHOTO_BOX_HEIGHT - draw_h) / 2.0;
            if let Err(err) = canvas.image(img, img_x, img_y, draw_w, draw_h) {
                warn!("photo embed failed, rendering placeholder: {err:#}");
                canvas.text("Photo unavailable", x + 10.0, box_y + PHOTO_BOX_HEIGHT / 2.0, FontStyle::Normal, 9.0, SLATE);
            }
        }
        PhotoArt::Failed => {
            canvas.text("Photo unavailable", x + 10.0, box_y + PHOTO_BOX_HEIGHT / 2.0, FontStyle::Normal, 9.0, SLATE);
        }
        PhotoArt::Missing => {
            canvas.text("No photo provided", x + 10.0, box_y + PHOTO_BOX_HEIGHT / 2.0, FontStyle::Normal, 9.0, SLATE);
        }
    }

    box_y + PHOTO_BOX_HEIGHT + 12.0
}

fn render_course_list(canvas: &mut Canvas, payload: &SubmissionPayload, x: f32, y: f32, width: f32) -> f32 {
    let list_text = if payload.courses.is_empty() {
        "N/A".to_string()
    } else {
        payload
            .courses
            .iter()
            .map(|c| format!("- {}", c.title))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let lines = split_to_width(&list_text, width - 16.0, 11.0);
    let box_height = lines.len() as f32 * LINE_HEIGHT + 16.0;
    canvas.set_fill(SURFACE);
    canvas.set_stroke(LINE);
    canvas.set_line_width(0.6);
    canvas.fill_stroke_rect(x, y, width, box_height);
    for (i, line) in lines.iter().enumerate() {
        canvas.text(line, x + 8.0, y + 12.0 + i as f32 * LINE_HEIGHT, FontStyle::Normal, 11.0, INK);
    }
    y + box_height + 12.0
}

fn render_signature_block(
    canvas: &mut Canvas,
    payload: &SubmissionPayload,
    drawn: Option<&DynamicImage>,
    x: f32,
    y: f32,
    width: f32,
) -> f32 {
    let box_height = 76.0;
    canvas.set_fill(SURFACE);
    canvas.set_stroke(LINE);
    canvas.set_line_width(0.6);
    canvas.fill_stroke_rect(x, y, width, box_height);

    let typed = payload.signature_typed.trim();
    if let Some(img) = drawn {
        if canvas.image(img, x + 10.0, y + 12.0, 160.0, 50.0).is_ok() {
            canvas.text("Signature provided digitally", x + 180.0, y + 40.0, FontStyle::Normal, 9.0, SLATE);
        } else {
            canvas.text("No signature provided", x + 10.0, y + 40.0, FontStyle::Normal, 10.0, SLATE);
        }
    } else if !typed.is_empty() {
        canvas.text(typed, x + 10.0, y + 40.0, FontStyle::Normal, 12.0, INK);
        canvas.set_stroke(SLATE);
        canvas.set_line_width(0.8);
        canvas.hline(x + 10.0, x + 240.0, y + 48.0);
    } else {
        canvas.text("No signature provided", x + 10.0, y + 40.0, FontStyle::Normal, 10.0, SLATE);
    }

    y + box_height + 12.0
}

fn decode_encoded_image(source: &str) -> Option<DynamicImage> {
    let encoded = if let Some(idx) = source.find("base64,") {
        &source[idx + "base64,".len()..]
    } else if source.contains(':') {
        return None;
    } else {
        source
    };
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    image::load_from_memory(&bytes).ok()
}

/// Resolves the photo descriptor into a decoded image. Missing source and
/// fetch/decode failures are distinct states; neither is an error.
async fn resolve_photo(photo: &StudentPhoto) -> PhotoArt {
    let Some(source) = photo.source() else {
        return PhotoArt::Missing;
    };
    if source.starts_with("http://") || source.starts_with("https://") {
        let bytes = match reqwest::get(source).await.and_then(|r| r.error_for_status()) {
            Ok(response) => match response.bytes().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!("photo fetch body failed: {err}");
                    return PhotoArt::Failed;
                }
            },
            Err(err) => {
                warn!("photo fetch failed: {err}");
                return PhotoArt::Failed;
            }
        };
        match image::load_from_memory(&bytes) {
            Ok(img) => PhotoArt::Ready(img),
            Err(err) => {
                warn!("photo decode failed: {err}");
                PhotoArt::Failed
            }
        }
    } else {
        match decode_encoded_image(source) {
            Some(img) => PhotoArt::Ready(img),
            None => {
                warn!("inlined photo data did not decode");
                PhotoArt::Failed
            }
        }
    }
}

/// Lays out the registration document for a payload. `today` is injected so
/// regeneration is reproducible; the only await is the photo fetch/decode.
pub async fn generate_registration_pdf(
    config: &InstitutionConfig,
    payload: &SubmissionPayload,
    today: NaiveDate,
) -> anyhow::Result<Vec<u8>> {
    let mut canvas = Canvas::new();
    let date_text = format!("Date: {}", format_date(today));
    let content_width = PAGE_WIDTH - MARGIN * 2.0;

    let mut y = draw_header(&mut canvas, config, &date_text);
    y = draw_section_header(&mut canvas, "Student Information", MARGIN, y, content_width);

    let left_width = content_width - PHOTO_BOX_WIDTH - COLUMN_GAP;
    let mut left_y = y;
    left_y = render_field(&mut canvas, "Student First Name", &payload.first_name, MARGIN, left_y, left_width);
    left_y = render_field(&mut canvas, "Student Last Name", &payload.last_name, MARGIN, left_y, left_width);
    left_y = render_field(&mut canvas, "Date of Birth", &format_date(payload.dob), MARGIN, left_y, left_width);
    left_y = render_field(&mut canvas, "Gender", &payload.gender_label, MARGIN, left_y, left_width);
    left_y = render_field(&mut canvas, "Address", &payload.address, MARGIN, left_y, left_width);
    left_y = render_field(&mut canvas, "Phone", &payload.phone, MARGIN, left_y, left_width);
    left_y = render_field(&mut canvas, "Email", &payload.email, MARGIN, left_y, left_width);
    left_y = render_field(&mut canvas, "School", &payload.school, MARGIN, left_y, left_width);

    let art = resolve_photo(&payload.student_photo).await;
    let photo_y = render_student_photo(&mut canvas, &art, MARGIN + left_width + COLUMN_GAP, y);

    y = left_y.max(photo_y) + 6.0;

    y = draw_section_header(&mut canvas, "Course Selection", MARGIN, y, content_width);
    y = render_course_list(&mut canvas, payload, MARGIN, y, content_width);
    y = render_field(&mut canvas, "Preferred Schedule", &payload.schedule_label, MARGIN, y, content_width);

    y = draw_section_header(&mut canvas, "Emergency Contact", MARGIN, y, content_width);
    y = render_field(&mut canvas, "Emergency Contact", &payload.emergency_name, MARGIN, y, content_width);
    y = render_field(&mut canvas, "Emergency Phone", &payload.emergency_phone, MARGIN, y, content_width);
    if !payload.guardian_name.trim().is_empty() {
        y = render_field(&mut canvas, "Guardian Name", &payload.guardian_name, MARGIN, y, content_width);
    }

    y = draw_section_header(&mut canvas, "Signature", MARGIN, y, content_width);
    let drawn = payload
        .signature_drawn
        .as_deref()
        .and_then(decode_encoded_image);
    y = render_signature_block(&mut canvas, payload, drawn.as_ref(), MARGIN, y, content_width);

    canvas.text(&config.disclaimer, MARGIN, y + 4.0, FontStyle::Normal, 9.0, SLATE);

    assemble_document(canvas)
}

fn assemble_document(canvas: Canvas) -> anyhow::Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_normal = doc.add_object(dictionary! {
        "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Helvetica",
    });
    let font_bold = doc.add_object(dictionary! {
        "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Helvetica-Bold",
    });

    let mut xobjects = Dictionary::new();
    for (i, stream) in canvas.images.into_iter().enumerate() {
        let id = doc.add_object(stream);
        xobjects.set(format!("Im{i}"), id);
    }

    let content = Content { operations: canvas.ops };
    let content_id = doc.add_object(Stream::new(
        Dictionary::new(),
        content.encode().context("encode content stream")?,
    ));

    let mut resources = dictionary! {
        "Font" => dictionary! { "F1" => font_normal, "F2" => font_bold },
    };
    if !xobjects.is_empty() {
        resources.set("XObject", xobjects);
    }

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Resources" => resources,
        "MediaBox" => vec![0f32.into(), 0f32.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        "Contents" => content_id,
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );

    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).context("serialize pdf")?;
    Ok(bytes)
}
