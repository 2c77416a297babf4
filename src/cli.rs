use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::entities::{MediaPolicy, ProjectTemplate};

#[cfg(feature = "ffmpeg")]
const MEDIA_BACKEND: &str = "playa-ffmpeg 8.0 (static)";
#[cfg(not(feature = "ffmpeg"))]
const MEDIA_BACKEND: &str = "built-in (WAV durations, placeholder video thumbnails)";

// Build version with backend info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Schema: ", crate::entities::CURRENT_SCHEMA_VERSION, "\n",
    "Media:  ", MEDIA_BACKEND, "\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Live-production project packages: create, inspect, import media, version
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging to file (default: vvstudio.log in the data directory)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE", global = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new project package from a template
    Create {
        title: String,

        /// Starting layout (see `templates`)
        #[arg(short = 't', long, default_value = "blank")]
        template: ProjectTemplate,

        /// copy or link (default from settings)
        #[arg(short = 'm', long = "media-policy", value_name = "POLICY")]
        media_policy: Option<MediaPolicy>,

        /// Parent directory of the package
        #[arg(short = 'd', long = "dir", value_name = "DIR", default_value = ".")]
        directory: PathBuf,
    },

    /// Show manifest, media and version summary of a package
    Info {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
    },

    /// Import media files using the project's media policy
    Import {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,

        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// Copy every linked media file into the package
    Collect {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
    },

    /// Copy a package under a new title and identity
    Duplicate {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,

        title: String,

        /// Destination directory (default: next to the source)
        #[arg(short = 'd', long = "dir", value_name = "DIR")]
        directory: Option<PathBuf>,
    },

    /// Move a package to the trash directory
    Delete {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
    },

    /// List saved versions of a package
    Versions {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
    },

    /// Restore a saved version and save it as the current state
    Restore {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,

        #[arg(value_name = "N")]
        version: u64,
    },

    /// List available project templates
    Templates,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create() {
        let args = Args::try_parse_from([
            "vvstudio", "-vv", "create", "My Show", "--template", "talk_show", "-m", "link",
        ])
        .unwrap();
        assert_eq!(args.verbosity, 2);
        match args.command {
            Command::Create {
                title,
                template,
                media_policy,
                directory,
            } => {
                assert_eq!(title, "My Show");
                assert_eq!(template, ProjectTemplate::TalkShow);
                assert_eq!(media_policy, Some(MediaPolicy::Link));
                assert_eq!(directory, PathBuf::from("."));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_import_requires_files() {
        assert!(Args::try_parse_from(["vvstudio", "import", "a.vvproj"]).is_err());
        assert!(Args::try_parse_from(["vvstudio", "create", "x", "-t", "opera"]).is_err());
    }
}
