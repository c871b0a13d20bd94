//! Render a video with a bottom-left logo, boxed captions and a German model.
//!
//! Usage: cargo run --example render -- path/to/video.mp4 path/to/assets

use captioner::{
    BrandingOptions, CaptionStyle, Corner, LogProgress, LogoStyle, Model, OutputSpec, RenderOptions, Toolchain,
    TranscribeOptions,
};

#[tokio::main]
async fn main() -> captioner::Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args.next().expect("usage: render <video> [asset-dir]");
    let assets = args.next().unwrap_or_else(|| ".".into());

    let options = RenderOptions::new()
        .transcribe(TranscribeOptions::new().model(Model::Small).language("de")?)
        .captions(CaptionStyle::new().box_opacity(Some(0.5))?)
        .logo(LogoStyle::default().corner(Corner::BottomLeft))
        .branding(BrandingOptions::new(assets))
        .output(OutputSpec::new("video_final.mp4"));

    let toolchain = Toolchain::discover(None, None)?;
    toolchain.validate()?;

    let report = captioner::render_file_with_options(&path, &options, &toolchain, &LogProgress).await?;
    println!("{} captions, {:.1}s -> {}", report.captions, report.duration, report.output.display());
    Ok(())
}
