use serde_json::Value;
use tracing::{debug, warn};

const ITUNES_SEARCH_URL: &str = "https://itunes.apple.com/search";

/// Cover art lookup against the iTunes search API.
pub struct ArtworkLookup {
    client: reqwest::Client,
    base_url: String,
}

impl ArtworkLookup {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, ITUNES_SEARCH_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Best-effort: any failure is logged and reads as "no artwork".
    pub async fn lookup(&self, query: &str) -> Option<String> {
        let url = format!(
            "{}?term={}&media=music&limit=1",
            self.base_url,
            urlencoding::encode(query)
        );

        let res = match self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => {
                warn!("Artwork lookup failed for {:?}: {}", query, e);
                return None;
            }
        };

        // iTunes answers with text/javascript, so parse the body by hand.
        let body = res.text().await.ok()?;
        let json: Value = match serde_json::from_str(&body) {
            Ok(json) => json,
            Err(e) => {
                warn!("Artwork lookup returned invalid JSON: {}", e);
                return None;
            }
        };

        let artwork = pick_artwork(&json);
        debug!("Artwork for {:?}: {:?}", query, artwork);
        artwork
    }
}

/// Largest artwork of the first result.
pub fn pick_artwork(json: &Value) -> Option<String> {
    let song = json["results"].as_array()?.first()?;
    ["artworkUrl100", "artworkUrl60", "artworkUrl30"]
        .iter()
        .find_map(|key| song[*key].as_str())
        .map(str::to_string)
}
