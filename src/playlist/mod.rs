mod track;

pub use track::{Track, TrackRef, is_remote};

/// 给每个条目分配位置 id（`_id`），用于“下一首”的查找
pub fn number_tracks<I>(refs: I) -> Vec<Track>
where
    I: IntoIterator,
    I::Item: Into<TrackRef>,
{
    refs.into_iter()
        .enumerate()
        .map(|(id, r)| Track {
            id,
            reference: r.into(),
        })
        .collect()
}
