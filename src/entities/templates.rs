//! Project templates: declarative presets applied once at creation.
//!
//! Each template is a row in a lookup table: input sources, audio buses and
//! the initial preview/program binding. Ids are positional (`input-1`,
//! `bus-1`) so applying a template twice yields identical documents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::session::Components;
use crate::error::ProjectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectTemplate {
    #[default]
    Blank,
    News,
    TalkShow,
    Podcast,
    Gaming,
    Concert,
    ProductDemo,
    Webinar,
    Interview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Camera,
    ScreenCapture,
}

impl SourceKind {
    fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Camera => "camera",
            SourceKind::ScreenCapture => "screen-capture",
        }
    }
}

struct Preset {
    inputs: &'static [(&'static str, SourceKind)],
    buses: &'static [&'static str],
    /// Indices into `inputs`
    preview: usize,
    program: usize,
}

use SourceKind::{Camera, ScreenCapture};

const BLANK: Preset = Preset {
    inputs: &[("Camera 1", Camera)],
    buses: &["Master"],
    preview: 0,
    program: 0,
};

const NEWS: Preset = Preset {
    inputs: &[
        ("Anchor Camera", Camera),
        ("Wide Camera", Camera),
        ("Graphics Screen", ScreenCapture),
    ],
    buses: &["Master", "Anchor Mic", "Field Reporter", "Music Bed"],
    preview: 1,
    program: 0,
};

const TALK_SHOW: Preset = Preset {
    inputs: &[
        ("Host Camera", Camera),
        ("Guest Camera", Camera),
        ("Wide Shot", Camera),
    ],
    buses: &["Master", "Host Mic", "Guest Mic", "Audience"],
    preview: 1,
    program: 2,
};

const PODCAST: Preset = Preset {
    inputs: &[("Host Camera", Camera), ("Guest Camera", Camera)],
    buses: &["Master", "Host 1", "Host 2", "Intro Music"],
    preview: 1,
    program: 0,
};

const GAMING: Preset = Preset {
    inputs: &[("Gameplay Capture", ScreenCapture), ("Facecam", Camera)],
    buses: &["Master", "Game Audio", "Microphone", "Alerts"],
    preview: 1,
    program: 0,
};

const CONCERT: Preset = Preset {
    inputs: &[
        ("Stage Left", Camera),
        ("Stage Right", Camera),
        ("Center Wide", Camera),
        ("Crowd Camera", Camera),
    ],
    buses: &["Master", "Stage Mix", "Crowd Mics"],
    preview: 0,
    program: 2,
};

const PRODUCT_DEMO: Preset = Preset {
    inputs: &[
        ("Presenter Camera", Camera),
        ("Product Close-up", Camera),
        ("Screen Capture", ScreenCapture),
    ],
    buses: &["Master", "Presenter Mic", "Demo Audio"],
    preview: 2,
    program: 0,
};

const WEBINAR: Preset = Preset {
    inputs: &[("Presenter Camera", Camera), ("Slides", ScreenCapture)],
    buses: &["Master", "Presenter Mic", "Q&A"],
    preview: 0,
    program: 1,
};

const INTERVIEW: Preset = Preset {
    inputs: &[
        ("Interviewer Camera", Camera),
        ("Guest Camera", Camera),
        ("Two Shot", Camera),
    ],
    buses: &["Master", "Interviewer Mic", "Guest Mic"],
    preview: 1,
    program: 2,
};

impl ProjectTemplate {
    pub const ALL: [ProjectTemplate; 9] = [
        ProjectTemplate::Blank,
        ProjectTemplate::News,
        ProjectTemplate::TalkShow,
        ProjectTemplate::Podcast,
        ProjectTemplate::Gaming,
        ProjectTemplate::Concert,
        ProjectTemplate::ProductDemo,
        ProjectTemplate::Webinar,
        ProjectTemplate::Interview,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProjectTemplate::Blank => "blank",
            ProjectTemplate::News => "news",
            ProjectTemplate::TalkShow => "talk-show",
            ProjectTemplate::Podcast => "podcast",
            ProjectTemplate::Gaming => "gaming",
            ProjectTemplate::Concert => "concert",
            ProjectTemplate::ProductDemo => "product-demo",
            ProjectTemplate::Webinar => "webinar",
            ProjectTemplate::Interview => "interview",
        }
    }

    fn preset(&self) -> &'static Preset {
        match self {
            ProjectTemplate::Blank => &BLANK,
            ProjectTemplate::News => &NEWS,
            ProjectTemplate::TalkShow => &TALK_SHOW,
            ProjectTemplate::Podcast => &PODCAST,
            ProjectTemplate::Gaming => &GAMING,
            ProjectTemplate::Concert => &CONCERT,
            ProjectTemplate::ProductDemo => &PRODUCT_DEMO,
            ProjectTemplate::Webinar => &WEBINAR,
            ProjectTemplate::Interview => &INTERVIEW,
        }
    }

    /// Build the four component documents for a fresh project.
    pub fn components(&self) -> Components {
        let preset = self.preset();

        let inputs: Vec<Value> = preset
            .inputs
            .iter()
            .enumerate()
            .map(|(i, (name, kind))| {
                json!({
                    "id": format!("input-{}", i + 1),
                    "name": name,
                    "kind": kind.as_str(),
                })
            })
            .collect();

        let buses: Vec<Value> = preset
            .buses
            .iter()
            .enumerate()
            .map(|(i, name)| {
                json!({
                    "id": format!("bus-{}", i + 1),
                    "name": name,
                    "volume": 1.0,
                    "muted": false,
                })
            })
            .collect();

        Components {
            timeline: json!({ "tracks": [], "markers": [] }),
            routing: json!({
                "inputSources": inputs,
                "previewSourceId": format!("input-{}", preset.preview + 1),
                "programSourceId": format!("input-{}", preset.program + 1),
            }),
            mixer: json!({
                "audioBuses": buses,
                "masterBusId": "bus-1",
            }),
            effects: json!({ "chains": [] }),
        }
    }
}

impl fmt::Display for ProjectTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProjectTemplate {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        Self::ALL
            .into_iter()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| ProjectError::UnknownTemplate(s.to_string()))
    }
}
