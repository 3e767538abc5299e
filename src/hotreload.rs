//! Scene directory watcher
//!
//! Watches the scenes root recursively. Editors often save as
//! "write temp, rename, delete old", so any event under the root counts as a change;
//! the render thread coalesces a burst of events into one rescan after a quiet period.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use warpeye_engine::logd;

/// Wait this long after the last event before rescanning.
pub const SETTLE: Duration = Duration::from_millis(500);

pub struct SceneWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<PathBuf>,
    pending_since: Option<Instant>,
}

impl SceneWatcher {
    pub fn new(root: &Path) -> anyhow::Result<Self> {
        let (tx, rx) = unbounded::<PathBuf>();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(ev) = res {
                    if matches!(ev.kind, EventKind::Access(_)) {
                        return;
                    }
                    for p in ev.paths {
                        let _ = tx.send(p);
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_millis(250)),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        Ok(Self {
            _watcher: watcher,
            rx,
            pending_since: None,
        })
    }

    /// Drain queued events. True once changes have settled and a rescan is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        for path in self.rx.try_iter() {
            logd!("WATCH", "changed: {}", path.display());
            self.pending_since = Some(now);
        }
        settled(&mut self.pending_since, now)
    }
}

fn settled(pending_since: &mut Option<Instant>, now: Instant) -> bool {
    match *pending_since {
        Some(t) if now.saturating_duration_since(t) >= SETTLE => {
            *pending_since = None;
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescans_once_after_quiet_period() {
        let t0 = Instant::now();
        let mut pending = Some(t0);
        assert!(!settled(&mut pending, t0 + Duration::from_millis(100)));
        assert!(settled(&mut pending, t0 + SETTLE));
        assert!(!settled(&mut pending, t0 + SETTLE * 2));
    }

    #[test]
    fn reports_changes_under_the_root() {
        let tmp = tempfile::tempdir().unwrap();
        let mut w = SceneWatcher::new(tmp.path()).unwrap();
        std::fs::create_dir(tmp.path().join("new_scene")).unwrap();

        // the backend delivers asynchronously, then the burst has to settle
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = false;
        while Instant::now() < deadline && !seen {
            std::thread::sleep(Duration::from_millis(50));
            seen = w.poll(Instant::now());
        }
        assert!(seen);
    }
}
