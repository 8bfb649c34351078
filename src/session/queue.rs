//! Logical track queue with a navigation cursor

use serde::{Deserialize, Serialize};

/// Immutable track value, embedded by value wherever it appears.
///
/// All fields are defaulted on deserialize because device events may carry
/// partial track objects.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub duration_ms: u64,
}

impl Track {
    /// Playable URI, derived from the id when the uri field is empty.
    pub fn playable_uri(&self) -> String {
        if !self.uri.is_empty() {
            self.uri.clone()
        } else {
            format!("spotify:track:{}", self.id)
        }
    }

    /// Whether `other` refers to the same track, by id first, uri second.
    pub fn same_track(&self, other: &Track) -> bool {
        if !self.id.is_empty() && !other.id.is_empty() {
            return self.id == other.id;
        }
        !self.uri.is_empty() && self.uri == other.uri
    }
}

/// Ordered track list plus the locally-authoritative navigation cursor.
///
/// The cursor tracks *intent*; what is actually playing is reported by the
/// device and lives in `PlaybackState`. Whenever `tracks` is non-empty,
/// `current_index` stays in bounds.
#[derive(Clone, Debug, Default)]
pub struct Queue {
    tracks: Vec<Track>,
    current_index: usize,
    context: Option<String>,
    diverged: bool,
}

impl Queue {
    /// Replace the queue wholesale. Returns the new current track when
    /// `start_index` is in range; an out-of-range start leaves no current
    /// track (the cursor is clamped to keep the bounds invariant).
    pub fn replace(
        &mut self,
        tracks: Vec<Track>,
        start_index: usize,
        context: &str,
    ) -> Option<Track> {
        let current = tracks.get(start_index).cloned();
        self.current_index = if tracks.is_empty() {
            0
        } else {
            start_index.min(tracks.len() - 1)
        };
        self.tracks = tracks;
        self.context = Some(context.to_string());
        self.diverged = false;
        current
    }

    /// Advance the cursor. At the end of the queue, returns `None` and
    /// leaves the cursor unchanged; that is a terminal state, not an error.
    pub fn next(&mut self) -> Option<Track> {
        let next_index = self.current_index + 1;
        let track = self.tracks.get(next_index)?.clone();
        self.current_index = next_index;
        Some(track)
    }

    /// Step the cursor back; `None` at the beginning, cursor unchanged.
    pub fn previous(&mut self) -> Option<Track> {
        let prev_index = self.current_index.checked_sub(1)?;
        let track = self.tracks.get(prev_index)?.clone();
        self.current_index = prev_index;
        Some(track)
    }

    /// Reconcile the cursor with a device-confirmed track. When the track
    /// is found in the queue the cursor snaps to it; otherwise the queue is
    /// flagged as diverged rather than guessing.
    pub fn sync_to_confirmed(&mut self, confirmed: &Track) {
        if self.tracks.is_empty() {
            return;
        }

        match self.tracks.iter().position(|t| t.same_track(confirmed)) {
            Some(index) => {
                if index != self.current_index {
                    tracing::debug!(
                        from = self.current_index,
                        to = index,
                        "Snapping queue cursor to device-confirmed track"
                    );
                }
                self.current_index = index;
                self.diverged = false;
            }
            None => {
                tracing::warn!(
                    track = %confirmed.playable_uri(),
                    "Device-confirmed track is not in the queue, marking diverged"
                );
                self.diverged = true;
            }
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.current_index)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn is_diverged(&self) -> bool {
        self.diverged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            uri: format!("spotify:track:{}", id),
            name: format!("Track {}", id),
            ..Track::default()
        }
    }

    fn three_track_queue(start: usize) -> Queue {
        let mut queue = Queue::default();
        queue.replace(vec![track("a"), track("b"), track("c")], start, "ctx");
        queue
    }

    #[test]
    fn replace_sets_cursor_and_current() {
        let queue = three_track_queue(1);
        assert_eq!(queue.current_index(), 1);
        assert_eq!(queue.current().unwrap().id, "b");
        assert_eq!(queue.context(), Some("ctx"));
    }

    #[test]
    fn out_of_range_start_has_no_current_track() {
        let mut queue = Queue::default();
        let current = queue.replace(vec![track("a")], 5, "ctx");
        assert!(current.is_none());
        // Cursor stays in bounds regardless
        assert_eq!(queue.current_index(), 0);
    }

    #[test]
    fn next_advances_until_the_end() {
        let mut queue = three_track_queue(1);
        assert_eq!(queue.next().unwrap().id, "c");
        assert_eq!(queue.current_index(), 2);

        assert!(queue.next().is_none());
        assert_eq!(queue.current_index(), 2);
    }

    #[test]
    fn previous_stops_at_the_beginning() {
        let mut queue = three_track_queue(0);
        assert!(queue.previous().is_none());
        assert_eq!(queue.current_index(), 0);
    }

    #[test]
    fn confirmed_track_snaps_cursor() {
        let mut queue = three_track_queue(0);
        queue.sync_to_confirmed(&track("c"));
        assert_eq!(queue.current_index(), 2);
        assert!(!queue.is_diverged());
    }

    #[test]
    fn unknown_confirmed_track_marks_divergence() {
        let mut queue = three_track_queue(1);
        queue.sync_to_confirmed(&track("zz"));
        assert!(queue.is_diverged());
        // Cursor untouched rather than guessed
        assert_eq!(queue.current_index(), 1);
    }

    #[test]
    fn replace_clears_divergence() {
        let mut queue = three_track_queue(1);
        queue.sync_to_confirmed(&track("zz"));
        assert!(queue.is_diverged());

        queue.replace(vec![track("d")], 0, "other");
        assert!(!queue.is_diverged());
    }

    #[test]
    fn playable_uri_falls_back_to_id() {
        let with_uri = track("a");
        assert_eq!(with_uri.playable_uri(), "spotify:track:a");

        let id_only = Track {
            id: "b".to_string(),
            ..Track::default()
        };
        assert_eq!(id_only.playable_uri(), "spotify:track:b");
    }
}
