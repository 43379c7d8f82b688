use std::path::{Path, PathBuf};

use anyhow::Context as _;
use cardsmith_core::config::EditorConfig;
use cardsmith_core::layers::Side;
use cardsmith_core::preset::{CardPreset, CardShape, Orientation};
use cardsmith_core::store::LayerStore;
use cardsmith_render::PreviewCompositor;
use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SideArg {
    Front,
    Back,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Front => Side::Front,
            SideArg::Back => Side::Back,
        }
    }
}

/// Render one side of a saved canvas state as a PNG.
#[derive(Parser, Debug)]
#[command(name = "cardsmith-preview", version)]
struct Cli {
    /// Canvas state JSON (`front`, `back`, `frontImage`, `backImage`).
    canvas_state: PathBuf,

    /// Card side to render.
    #[arg(value_enum)]
    side: SideArg,

    /// Output PNG path.
    out: PathBuf,

    /// Output pixels per design pixel.
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// Font file to register (repeatable).
    #[arg(long = "font")]
    fonts: Vec<PathBuf>,

    /// Use the portrait card preset.
    #[arg(long, default_value_t = false)]
    portrait: bool,

    /// Use the rounded card preset.
    #[arg(long, default_value_t = false)]
    rounded: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let out = run(&cli)?;
    eprintln!("wrote {}", out.display());
    Ok(())
}

fn run(cli: &Cli) -> anyhow::Result<PathBuf> {
    let orientation = if cli.portrait {
        Orientation::Portrait
    } else {
        Orientation::Landscape
    };
    let shape = if cli.rounded {
        CardShape::Rounded
    } else {
        CardShape::Rectangle
    };
    let preset = CardPreset::business_card(orientation, shape);

    let raw = std::fs::read_to_string(&cli.canvas_state)
        .with_context(|| format!("read canvas state '{}'", cli.canvas_state.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("parse canvas state '{}'", cli.canvas_state.display()))?;

    let mut store = LayerStore::try_new(preset.clone(), EditorConfig::default()).context("card setup")?;
    store.restore_json(&value);

    let mut compositor = PreviewCompositor::new();
    for font in &cli.fonts {
        let bytes = std::fs::read(font).with_context(|| format!("read font '{}'", font.display()))?;
        let families = compositor
            .register_font(bytes)
            .with_context(|| format!("register font '{}'", font.display()))?;
        log::info!("Loaded {} ({})", font.display(), families.join(", "));
    }

    let side = Side::from(cli.side);
    let assets_root = cli
        .canvas_state
        .parent()
        .unwrap_or_else(|| Path::new("."));
    if let Some(image) = &store.design().side(side).image {
        let path = assets_root.join(&image.src);
        match std::fs::read(&path) {
            Ok(bytes) => {
                compositor
                    .register_image(image.src.clone(), &bytes)
                    .with_context(|| format!("decode image '{}'", path.display()))?;
            }
            Err(e) => log::warn!("Image '{}' not readable ({}), using placeholder", path.display(), e),
        }
    }

    let preview = compositor.render_side(store.design(), side, &preset, cli.scale)?;
    let png = preview.encode_png()?;

    if let Some(parent) = cli.out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir '{}'", parent.display()))?;
        }
    }
    std::fs::write(&cli.out, png).with_context(|| format!("write png '{}'", cli.out.display()))?;
    Ok(cli.out.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::ffi::OsStr;

    fn write_logo(dir: &Path) {
        let img = image::RgbaImage::from_pixel(8, 8, image::Rgba([0, 128, 0, 255]));
        img.save_with_format(dir.join("logo.png"), image::ImageFormat::Png).unwrap();
    }

    #[test]
    fn test_args_parse() {
        let cli = Cli::try_parse_from([
            "cardsmith-preview",
            "state.json",
            "back",
            "out.png",
            "--scale",
            "0.5",
            "--rounded",
        ])
        .unwrap();
        assert!(matches!(cli.side, SideArg::Back));
        assert_eq!(cli.scale, 0.5);
        assert!(cli.rounded);
        assert!(!cli.portrait);
        assert!(Cli::try_parse_from(["cardsmith-preview", "state.json", "middle", "out.png"]).is_err());
    }

    #[test]
    fn test_renders_canvas_state_to_png() {
        let dir = tempfile::tempdir().unwrap();
        write_logo(dir.path());
        let state = json!({
            "front": [{ "id": "t1", "text": "Hi", "x": 10, "y": 10 }],
            "back": [],
            "frontImage": { "src": "logo.png", "x": 450, "y": 270, "width": 100, "height": 100 },
            "backImage": null
        });
        let state_path = dir.path().join("state.json");
        std::fs::write(&state_path, state.to_string()).unwrap();

        let cli = Cli::try_parse_from([
            OsStr::new("cardsmith-preview"),
            state_path.as_os_str(),
            OsStr::new("front"),
            dir.path().join("out/front.png").as_os_str(),
            OsStr::new("--portrait"),
        ])
        .unwrap();
        let out = run(&cli).unwrap();

        let decoded = image::open(&out).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (540, 900));
        // Portrait canvas is 540 wide, so the logo centered at x=450 spans 400..500.
        let [r, g, b, a] = decoded.get_pixel(450, 270).0;
        assert!(r < 8 && (120..=136).contains(&g) && b < 8 && a == 255);
        assert_eq!(decoded.get_pixel(300, 600).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_missing_state_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            OsStr::new("cardsmith-preview"),
            dir.path().join("missing.json").as_os_str(),
            OsStr::new("front"),
            dir.path().join("out.png").as_os_str(),
        ])
        .unwrap();
        assert!(run(&cli).is_err());
    }
}
