use gloo_storage::{LocalStorage, Storage};
use serde::{Deserialize, Serialize};

const FLAGS_KEY: &str = "fieldmap_ui_flags";

/// One-time UI state remembered across sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiFlags {
    /// The drawing instructions have been shown once; later editors stay quiet.
    pub draw_hint_shown: bool,
}

impl UiFlags {
    pub fn load() -> Self {
        LocalStorage::get(FLAGS_KEY).unwrap_or_default()
    }

    pub fn save(&self) {
        if let Err(err) = LocalStorage::set(FLAGS_KEY, self) {
            tracing::debug!(%err, "ui flags not persisted");
        }
    }

    /// True the first time only; the hint counts as shown once it opens.
    pub fn claim_draw_hint(&mut self) -> bool {
        !std::mem::replace(&mut self.draw_hint_shown, true)
    }
}

/// Whether to open the drawing hint now. Records it as shown when it is.
pub fn take_draw_hint() -> bool {
    let mut flags = UiFlags::load();
    let show = flags.claim_draw_hint();
    if show {
        flags.save();
    }
    show
}
