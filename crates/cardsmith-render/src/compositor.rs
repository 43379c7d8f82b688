//! CPU compositor for card side previews.
//!
//! Flattens one side of a [`Design`] into an RGBA raster: the canvas is
//! clipped to the preset outline and filled white, then the image layer and
//! the text layers are drawn in stacking order.

use base64::Engine;
use cardsmith_core::layers::{
    FontStyle, ImageLayer, Side, TextAlign, TextDecoration, TextLayer, parse_hex_color,
};
use cardsmith_core::preset::CardPreset;
use cardsmith_core::store::Design;
use kurbo::{Affine, BezPath, Point, Rect, Shape as _, Stroke};
use parley::layout::PositionedLayoutItem;
use parley::{FontContext, LayoutContext, StyleProperty};
use peniko::Color;
use peniko::color::PremulRgba8;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use vello_cpu::{Pixmap, RenderContext};

/// Compositor errors.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invalid output size: {0}")]
    InvalidSize(String),
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Failed to encode image: {0}")]
    Encode(String),
    #[error("No font families found in font data")]
    NoFontFamilies,
}

/// Result type for compositor operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// RGBA8 brush carried through text layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextBrush {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl TextBrush {
    fn from_hex(color: &str) -> Self {
        let rgba = parse_hex_color(color).unwrap_or(Color::BLACK).to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }

    fn color(&self) -> Color {
        Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}

/// Flattened preview raster.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewImage {
    /// RGBA pixel data (4 bytes per pixel, not premultiplied).
    pub rgba_data: Vec<u8>,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
}

impl PreviewImage {
    /// RGBA value at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        let px = self.rgba_data.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Encode as an 8-bit RGBA PNG.
    pub fn encode_png(&self) -> RenderResult<Vec<u8>> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder
                .write_header()
                .map_err(|e| RenderError::Encode(e.to_string()))?;
            writer
                .write_image_data(&self.rgba_data)
                .map_err(|e| RenderError::Encode(e.to_string()))?;
            writer
                .finish()
                .map_err(|e| RenderError::Encode(e.to_string()))?;
        }
        Ok(out)
    }

    /// PNG data URL, usable directly as a thumbnail reference.
    pub fn to_data_url(&self) -> RenderResult<String> {
        let png = self.encode_png()?;
        Ok(format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        ))
    }
}

/// Decoded image ready to paint.
#[derive(Debug, Clone)]
struct CachedImage {
    paint: vello_cpu::Image,
    width: u32,
    height: u32,
}

/// Renders card sides with a CPU rasterizer.
///
/// Fonts and images are registered up front; the compositor never touches
/// the network or the file system.
pub struct PreviewCompositor {
    font_cx: FontContext,
    layout_cx: LayoutContext<TextBrush>,
    /// Decoded images keyed by layer source.
    images: HashMap<String, CachedImage>,
    /// Families tried after a layer's own family.
    fallback_families: Vec<String>,
}

impl Default for PreviewCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewCompositor {
    /// Create a compositor with no fonts and no images.
    pub fn new() -> Self {
        Self {
            font_cx: FontContext::default(),
            layout_cx: LayoutContext::new(),
            images: HashMap::new(),
            fallback_families: Vec::new(),
        }
    }

    /// Register a font file. Returns the family names it provides.
    ///
    /// The first registered families also serve as fallbacks for layers
    /// whose family is unknown.
    pub fn register_font(&mut self, bytes: Vec<u8>) -> RenderResult<Vec<String>> {
        let families = self
            .font_cx
            .collection
            .register_fonts(parley::fontique::Blob::from(bytes), None);
        let names: Vec<String> = families
            .iter()
            .filter_map(|(id, _)| self.font_cx.collection.family_name(*id).map(str::to_string))
            .collect();
        if names.is_empty() {
            return Err(RenderError::NoFontFamilies);
        }
        for name in &names {
            if !self.fallback_families.contains(name) {
                self.fallback_families.push(name.clone());
            }
        }
        log::debug!("Registered font families {:?}", names);
        Ok(names)
    }

    /// Decode and cache an image under its layer source.
    ///
    /// Returns the pixel dimensions.
    pub fn register_image(&mut self, src: impl Into<String>, bytes: &[u8]) -> RenderResult<(u32, u32)> {
        let src = src.into();
        let decoded = ::image::load_from_memory(bytes).map_err(|e| RenderError::Decode(e.to_string()))?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        let (w, h) = match (u16::try_from(width), u16::try_from(height)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
            _ => {
                return Err(RenderError::InvalidSize(format!(
                    "image {width}x{height} exceeds the rasterizer limits"
                )));
            }
        };
        let may_have_opacities = rgba.pixels().any(|p| p.0[3] < 255);
        let pixels: Vec<PremulRgba8> = rgba
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0;
                let premul = |c: u8| ((u16::from(c) * u16::from(a) + 127) / 255) as u8;
                PremulRgba8 {
                    r: premul(r),
                    g: premul(g),
                    b: premul(b),
                    a,
                }
            })
            .collect();
        let pixmap = Pixmap::from_parts_with_opacity(pixels, w, h, may_have_opacities);
        let paint = vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
            sampler: vello_cpu::peniko::ImageSampler::default(),
        };
        self.images.insert(src, CachedImage { paint, width, height });
        Ok((width, height))
    }

    pub fn has_image(&self, src: &str) -> bool {
        self.images.contains_key(src)
    }

    /// Render one side at `scale` output pixels per design pixel.
    pub fn render_side(
        &mut self,
        design: &Design,
        side: Side,
        preset: &CardPreset,
        scale: f64,
    ) -> RenderResult<PreviewImage> {
        let (width, height) = output_size(preset, scale)?;
        let mut ctx = RenderContext::new(width, height);
        let base = Affine::scale(scale);

        ctx.set_paint_transform(Affine::IDENTITY);
        ctx.set_transform(base);
        ctx.push_clip_layer(&preset.clip_shape().to_path(0.1));

        ctx.set_paint(Color::WHITE);
        ctx.fill_rect(&preset.canvas_rect());

        let layers = design.side(side);
        if let Some(image) = &layers.image {
            self.draw_image(&mut ctx, image, base);
        }
        for text in &layers.text {
            self.draw_text(&mut ctx, text, base);
        }

        ctx.pop_layer();
        ctx.flush();
        let mut pixmap = Pixmap::new(width, height);
        ctx.render_to_pixmap(&mut pixmap);

        let rgba_data = pixmap
            .take_unpremultiplied()
            .into_iter()
            .flat_map(|px| [px.r, px.g, px.b, px.a])
            .collect();
        log::debug!(
            "Rendered {} side preview at {}x{} ({} text layers)",
            side.as_str(),
            width,
            height,
            layers.text.len()
        );
        Ok(PreviewImage {
            rgba_data,
            width: u32::from(width),
            height: u32::from(height),
        })
    }

    fn draw_image(&mut self, ctx: &mut RenderContext, layer: &ImageLayer, base: Affine) {
        let bounds = layer.bounds();
        if !(bounds.width() > 0.0 && bounds.height() > 0.0) {
            return;
        }
        let transform = base * Affine::rotate_about(layer.rotation.to_radians(), layer.center());
        let Some(cached) = self.images.get(&layer.src) else {
            log::debug!("No decoded image for {}, drawing placeholder", layer.src);
            draw_image_placeholder(ctx, bounds, transform);
            return;
        };
        let (w, h) = (f64::from(cached.width), f64::from(cached.height));
        ctx.set_transform(
            transform
                * Affine::translate((bounds.x0, bounds.y0))
                * Affine::scale_non_uniform(bounds.width() / w, bounds.height() / h),
        );
        ctx.set_paint(cached.paint.clone());
        ctx.fill_rect(&Rect::new(0.0, 0.0, w, h));
    }

    fn draw_text(&mut self, ctx: &mut RenderContext, text: &TextLayer, base: Affine) {
        if !text.has_visible_text() {
            return;
        }
        let brush = TextBrush::from_hex(&text.color);
        let font_size = text.font_size.max(1) as f32;

        let mut families = vec![parley::FontFamilyName::Named(Cow::Owned(text.font_family.clone()))];
        families.extend(
            self.fallback_families
                .iter()
                .filter(|name| **name != text.font_family)
                .map(|name| parley::FontFamilyName::Named(Cow::Owned(name.clone()))),
        );

        let mut builder = self
            .layout_cx
            .ranged_builder(&mut self.font_cx, &text.text, 1.0, false);
        builder.push_default(StyleProperty::FontFamily(parley::FontFamily::List(Cow::Owned(families))));
        builder.push_default(StyleProperty::FontSize(font_size));
        builder.push_default(StyleProperty::FontWeight(parley::FontWeight::new(text.font_weight.value())));
        builder.push_default(StyleProperty::FontStyle(match text.font_style {
            FontStyle::Normal => parley::FontStyle::Normal,
            FontStyle::Italic => parley::FontStyle::Italic,
        }));
        builder.push_default(StyleProperty::LineHeight(parley::LineHeight::FontSizeRelative(
            text.line_height as f32,
        )));
        builder.push_default(StyleProperty::LetterSpacing(text.letter_spacing as f32));
        builder.push_default(StyleProperty::Underline(text.text_decoration == TextDecoration::Underline));
        builder.push_default(StyleProperty::Brush(brush));
        let mut layout = builder.build(&text.text);

        let max_width = (text.width > 0.0).then_some(text.width as f32);
        layout.break_all_lines(max_width);
        layout.align(
            match text.text_align {
                TextAlign::Left => parley::Alignment::Left,
                TextAlign::Center => parley::Alignment::Center,
                TextAlign::Right => parley::Alignment::Right,
            },
            parley::AlignmentOptions::default(),
        );

        let transform = base
            * Affine::rotate_about(text.rotation.to_radians(), text.center())
            * Affine::translate((text.x, text.y));
        ctx.set_transform(transform);

        let mut glyph_count = 0;
        for line in layout.lines() {
            for item in line.items() {
                let PositionedLayoutItem::GlyphRun(glyph_run) = item else {
                    continue;
                };
                let style = glyph_run.style();
                let run = glyph_run.run();
                let glyphs: Vec<vello_cpu::Glyph> = glyph_run
                    .positioned_glyphs()
                    .map(|g| vello_cpu::Glyph {
                        id: g.id,
                        x: g.x,
                        y: g.y,
                    })
                    .collect();
                glyph_count += glyphs.len();
                if !glyphs.is_empty() {
                    ctx.set_paint(style.brush.color());
                    ctx.glyph_run(run.font())
                        .font_size(run.font_size())
                        .fill_glyphs(glyphs.into_iter());
                }
                if let Some(underline) = &style.underline {
                    let metrics = run.metrics();
                    let offset = underline.offset.unwrap_or(metrics.underline_offset);
                    let size = underline.size.unwrap_or(metrics.underline_size).max(1.0);
                    let top = glyph_run.baseline() - offset;
                    let x0 = glyph_run.offset();
                    ctx.set_paint(underline.brush.color());
                    ctx.fill_rect(&Rect::new(
                        f64::from(x0),
                        f64::from(top),
                        f64::from(x0 + glyph_run.advance()),
                        f64::from(top + size),
                    ));
                }
            }
        }

        // Font not found: keep the layer visible.
        if glyph_count == 0 {
            let bar_height = (f64::from(font_size) * text.line_height.max(1.0)).min(text.height.max(1.0));
            let bar = Rect::new(0.0, 0.0, text.width.max(20.0), bar_height);
            let tint = brush.color().with_alpha(0.4);
            ctx.set_paint(tint);
            ctx.fill_rect(&bar);
        }
    }
}

/// Probe an encoded image's pixel dimensions without decoding the pixels.
pub fn probe_dimensions(bytes: &[u8]) -> RenderResult<(u32, u32)> {
    ::image::ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| RenderError::Decode(e.to_string()))?
        .into_dimensions()
        .map_err(|e| RenderError::Decode(e.to_string()))
}

fn output_size(preset: &CardPreset, scale: f64) -> RenderResult<(u16, u16)> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(RenderError::InvalidSize(format!("scale must be positive, got {scale}")));
    }
    let width = (preset.width * scale).round();
    let height = (preset.height * scale).round();
    let limit = f64::from(u16::MAX);
    if !(width >= 1.0 && height >= 1.0 && width <= limit && height <= limit) {
        return Err(RenderError::InvalidSize(format!(
            "{}x{} at scale {} gives a {}x{} raster",
            preset.width, preset.height, scale, width, height
        )));
    }
    Ok((width as u16, height as u16))
}

/// Gray box with a cross, for images that are not decoded.
fn draw_image_placeholder(ctx: &mut RenderContext, bounds: Rect, transform: Affine) {
    ctx.set_transform(transform);
    ctx.set_paint(Color::from_rgba8(200, 200, 200, 255));
    ctx.fill_rect(&bounds);

    let mut cross = BezPath::new();
    cross.move_to(Point::new(bounds.x0, bounds.y0));
    cross.line_to(Point::new(bounds.x1, bounds.y1));
    cross.move_to(Point::new(bounds.x1, bounds.y0));
    cross.line_to(Point::new(bounds.x0, bounds.y1));
    ctx.set_stroke(Stroke::new(2.0));
    ctx.set_paint(Color::from_rgba8(150, 150, 150, 255));
    ctx.stroke_path(&cross);
}
