use std::path::PathBuf;

use clap::Parser;

use warpeye_engine::warp::WarpMode;

/// Project a looping video through a knob-controlled warp mesh.
#[derive(Parser, Debug, Clone)]
#[command(name = "warpeye", version, about)]
pub struct Args {
    /// Borderless fullscreen on the primary monitor.
    #[arg(long)]
    pub fullscreen: bool,

    /// Mirror the texture horizontally (rear projection).
    #[arg(long)]
    pub invert: bool,

    /// Advance to the next scene every `showreel_secs`.
    #[arg(long)]
    pub showreel: bool,

    /// Scene root; overrides `scenes_dir` from warpeye.json.
    #[arg(long, value_name = "DIR")]
    pub scenes: Option<PathBuf>,

    /// Also append log lines to this file.
    #[arg(long, value_name = "PATH", env = "WARPEYE_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Treat unknown or malformed config keys as errors.
    #[arg(long)]
    pub strict: bool,

    /// Do not open MIDI input (OSC still works when enabled).
    #[arg(long)]
    pub no_midi: bool,

    /// Initial warp mode.
    #[arg(long, value_name = "MODE", default_value = "parameter")]
    pub warp: WarpMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["warpeye"]).unwrap();
        assert!(!args.fullscreen && !args.invert && !args.showreel && !args.strict && !args.no_midi);
        assert_eq!(args.warp, WarpMode::Parameter);
        assert!(args.scenes.is_none());
    }

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "warpeye",
            "--fullscreen",
            "--invert",
            "--scenes",
            "/srv/scenes",
            "--warp",
            "none",
            "--no-midi",
        ])
        .unwrap();
        assert!(args.fullscreen && args.invert && args.no_midi);
        assert_eq!(args.scenes, Some(PathBuf::from("/srv/scenes")));
        assert_eq!(args.warp, WarpMode::None);
    }

    #[test]
    fn rejects_unknown_warp() {
        assert!(Args::try_parse_from(["warpeye", "--warp", "spiral"]).is_err());
    }
}
