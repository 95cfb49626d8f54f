// ============================================================================
// PixelFE CLI — headless project inspection and PNG export
// ============================================================================
//
// Usage examples:
//   pixelfe --input sprites.pxe --info
//   pixelfe --input sprites.pxe --export frame.png --scale 4
//   pixelfe --input sprites.pxe --export walk2.png --animation 1 --frame 2
//   pixelfe --make-sample demo.pxe
//
// No GUI exists in this crate; everything runs synchronously on the
// current thread.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use image::RgbaImage;

use crate::color::Color;
use crate::config::EngineSettings;
use crate::editor::Editor;
use crate::ops::brush::BrushTip;
use crate::ops::fill::FillOrder;
use crate::ops::shapes::StrokeBrush;
use crate::project::{self, Animation, AnimationGroup, Project, SpriteFrame};

/// PixelFE headless project tool.
///
/// Inspect sprite project files and export frames as PNG without a GUI.
#[derive(Parser, Debug)]
#[command(
    name = "pixelfe",
    about = "PixelFE headless sprite project tool",
    long_about = "Inspect PixelFE project files (.pxe) and export individual sprite\n\
                  frames to PNG at integer zoom levels.\n\n\
                  Example:\n  \
                  pixelfe --input sprites.pxe --export frame.png --scale 4"
)]
pub struct CliArgs {
    /// Project file to read.
    #[arg(short, long, value_name = "FILE.pxe", required_unless_present = "make_sample")]
    pub input: Option<PathBuf>,

    /// Print the project structure and exit.
    #[arg(long, default_value_t = false)]
    pub info: bool,

    /// Export one frame as PNG to this path.
    #[arg(short, long, value_name = "FILE.png")]
    pub export: Option<PathBuf>,

    /// Integer zoom factor for export (1, 2 and 4 use the fast paths).
    #[arg(short, long, default_value_t = 1, value_name = "N")]
    pub scale: u32,

    /// Animation group index for export.
    #[arg(long, default_value_t = 0)]
    pub group: usize,

    /// Animation index within the group.
    #[arg(long, default_value_t = 0)]
    pub animation: usize,

    /// Frame index within the animation.
    #[arg(long, default_value_t = 0)]
    pub frame: usize,

    /// Write a small generated sample project to this path and exit.
    #[arg(long, value_name = "FILE.pxe")]
    pub make_sample: Option<PathBuf>,
}

pub fn run(args: CliArgs) -> ExitCode {
    if let Some(path) = &args.make_sample {
        return match project::write_file(path, &sample_project()) {
            Ok(()) => {
                println!("wrote sample project to {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let input = args.input.as_ref().expect("clap enforces --input");
    let proj = match project::read_file(input) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: failed to load {}: {e}", input.display());
            return ExitCode::FAILURE;
        }
    };

    if args.info || args.export.is_none() {
        print_info(&proj);
    }

    if let Some(out) = &args.export {
        let Some(frame) = proj
            .groups
            .get(args.group)
            .and_then(|g| g.animations.get(args.animation))
            .and_then(|a| a.frames.get(args.frame))
        else {
            eprintln!(
                "error: no frame at group {} / animation {} / frame {}",
                args.group, args.animation, args.frame
            );
            return ExitCode::FAILURE;
        };

        let scale = args.scale.max(1);
        let canvas = frame.to_canvas();
        let mut target = RgbaImage::new(frame.width * scale, frame.height * scale);
        canvas.composite_to(&mut target, 1.0);
        if let Err(e) = target.save(out) {
            eprintln!("error: failed to write {}: {e}", out.display());
            return ExitCode::FAILURE;
        }
        println!(
            "exported {}x{} frame at {scale}x to {}",
            frame.width,
            frame.height,
            out.display()
        );
    }
    ExitCode::SUCCESS
}

fn print_info(proj: &Project) {
    println!("{} animation group(s)", proj.groups.len());
    for (gi, group) in proj.groups.iter().enumerate() {
        println!("  group {gi}: {} animation(s)", group.animations.len());
        for (ai, anim) in group.animations.iter().enumerate() {
            println!(
                "    animation {ai}: {}x{}, {} frame(s)",
                anim.width,
                anim.height,
                anim.frames.len()
            );
        }
    }
}

/// Draw a small two-frame sprite through the editor so the sample file
/// exercises the same code paths as interactive edits.
fn sample_project() -> Project {
    let mut frames = Vec::new();
    for phase in 0..2u32 {
        let mut ed = Editor::new(16, 16, EngineSettings::default());
        let brush = StrokeBrush::Stamp { tip: BrushTip::Round };
        let outline = Color::parse("#202020").expect("static color");
        let body = Color::parse("#3FA07B").expect("static color");

        ed.stroke_ellipse((7.5, 7.5), (6.0, 5.0 + phase as f32), brush, 1, outline)
            .expect("fresh canvas is unlocked");
        let _ = ed.fill((7, 7), body, FillOrder::Depth);
        frames.push(SpriteFrame::from_canvas(&ed.state.layers[0].canvas));
    }
    Project {
        groups: vec![AnimationGroup {
            animations: vec![Animation {
                width: 16,
                height: 16,
                frames,
            }],
        }],
    }
}
