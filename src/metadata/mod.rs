pub mod artwork;
pub mod now_playing;

pub use artwork::ArtworkLookup;
pub use now_playing::{NowPlaying, NowPlayingTracker};
