use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::captions::{CaptionError, CaptionService, CaptionTrack, timedtext};
use crate::config::CaptionConfig;
use crate::error::Result;
use crate::types::FetchedCaptions;
use crate::video_id::VideoId;

const WATCH_URL: &str = "https://www.youtube.com/watch";
const PLAYER_URL: &str = "https://www.youtube.com/youtubei/v1/player";
const TIMEDTEXT_URL: &str = "https://www.youtube.com/api/timedtext";
const INNERTUBE_CLIENT_NAME: &str = "ANDROID";
const INNERTUBE_CLIENT_VERSION: &str = "20.10.38";

/// Caption service backed by YouTube's player and timedtext endpoints.
#[derive(Clone)]
pub struct YoutubeCaptions {
    client: reqwest::Client,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    captions: Option<Captions>,
}

#[derive(Deserialize)]
struct PlayabilityStatus {
    status: String,
    reason: Option<String>,
}

#[derive(Deserialize)]
struct Captions {
    #[serde(rename = "playerCaptionsTracklistRenderer")]
    renderer: Option<TracklistRenderer>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TracklistRenderer {
    #[serde(default)]
    caption_tracks: Vec<RawTrack>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrack {
    base_url: String,
    name: Option<TrackName>,
    language_code: String,
    kind: Option<String>,
    #[serde(default)]
    is_translatable: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackName {
    simple_text: Option<String>,
    runs: Option<Vec<TextRun>>,
}

#[derive(Deserialize)]
struct TextRun {
    text: String,
}

impl From<RawTrack> for CaptionTrack {
    fn from(raw: RawTrack) -> Self {
        let language = raw
            .name
            .and_then(|n| {
                n.simple_text.or_else(|| {
                    n.runs
                        .map(|runs| runs.into_iter().map(|r| r.text).collect::<String>())
                })
            })
            .unwrap_or_else(|| raw.language_code.clone());
        CaptionTrack {
            is_generated: raw.kind.as_deref() == Some("asr"),
            is_translatable: raw.is_translatable,
            language,
            language_code: raw.language_code,
            base_url: raw.base_url,
        }
    }
}

impl YoutubeCaptions {
    pub fn new(config: &CaptionConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(
            reqwest::header::COOKIE,
            reqwest::header::HeaderValue::from_static("CONSENT=YES+cb"),
        );

        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers);

        if let Some(url) = &config.proxy_url {
            let mut proxy = reqwest::Proxy::all(url.as_str())?;
            if let (Some(user), Some(pass)) = (&config.proxy_username, &config.proxy_password) {
                proxy = proxy.basic_auth(user, pass);
            }
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    async fn send_for_text(&self, request: RequestBuilder) -> std::result::Result<String, CaptionError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }
        Ok(response.text().await?)
    }

    async fn innertube_key(&self, video_id: &VideoId) -> std::result::Result<String, CaptionError> {
        let html = self
            .send_for_text(self.client.get(WATCH_URL).query(&[("v", video_id.as_str())]))
            .await?;

        if html.contains("class=\"g-recaptcha\"") {
            return Err(CaptionError::Blocked("captcha challenge on watch page".into()));
        }

        extract_between(&html, "\"INNERTUBE_API_KEY\":\"", "\"")
            .map(str::to_string)
            .ok_or_else(|| {
                if html.contains("\"status\":\"ERROR\"") {
                    CaptionError::NotFound(format!("video {video_id} unavailable"))
                } else {
                    CaptionError::Malformed("watch page without innertube key".into())
                }
            })
    }

    async fn fetch_url(
        &self,
        url: Url,
        language: Option<String>,
        language_code: Option<String>,
        is_generated: Option<bool>,
    ) -> std::result::Result<FetchedCaptions, CaptionError> {
        let body = self.send_for_text(self.client.get(url)).await?;
        let segments = timedtext::parse(&body)?;
        Ok(FetchedCaptions {
            language,
            language_code,
            is_generated,
            segments,
        })
    }
}

#[async_trait]
impl CaptionService for YoutubeCaptions {
    async fn list_tracks(&self, video_id: &VideoId) -> std::result::Result<Vec<CaptionTrack>, CaptionError> {
        let key = self.innertube_key(video_id).await?;

        let body = serde_json::json!({
            "context": {
                "client": {
                    "clientName": INNERTUBE_CLIENT_NAME,
                    "clientVersion": INNERTUBE_CLIENT_VERSION,
                }
            },
            "videoId": video_id.as_str(),
        });
        let text = self
            .send_for_text(
                self.client
                    .post(PLAYER_URL)
                    .query(&[("key", key.as_str())])
                    .json(&body),
            )
            .await?;
        let player: PlayerResponse =
            serde_json::from_str(&text).map_err(|e| CaptionError::Malformed(e.to_string()))?;

        if let Some(status) = &player.playability_status {
            check_playability(status)?;
        }

        let tracks: Vec<CaptionTrack> = player
            .captions
            .and_then(|c| c.renderer)
            .map(|r| r.caption_tracks.into_iter().map(CaptionTrack::from).collect())
            .unwrap_or_default();

        if tracks.is_empty() {
            return Err(CaptionError::Disabled);
        }
        debug!(video_id = %video_id, tracks = tracks.len(), "listed caption tracks");
        Ok(tracks)
    }

    async fn fetch_track(&self, track: &CaptionTrack) -> std::result::Result<FetchedCaptions, CaptionError> {
        let url = track_url(&track.base_url, None)?;
        self.fetch_url(
            url,
            Some(track.language.clone()),
            Some(track.language_code.clone()),
            Some(track.is_generated),
        )
        .await
    }

    async fn fetch_translated(
        &self,
        track: &CaptionTrack,
        target_language: &str,
    ) -> std::result::Result<FetchedCaptions, CaptionError> {
        if !track.is_translatable {
            return Err(CaptionError::NotFound(format!(
                "track {} is not translatable",
                track.language_code
            )));
        }
        let url = track_url(&track.base_url, Some(target_language))?;
        self.fetch_url(
            url,
            Some(target_language.to_string()),
            Some(target_language.to_string()),
            Some(track.is_generated),
        )
        .await
    }

    async fn fetch_direct(
        &self,
        video_id: &VideoId,
        languages: &[String],
    ) -> std::result::Result<FetchedCaptions, CaptionError> {
        let mut last_error = None;

        for lang in languages {
            for generated in [false, true] {
                let mut url = Url::parse(TIMEDTEXT_URL)
                    .map_err(|e| CaptionError::Malformed(e.to_string()))?;
                url.query_pairs_mut()
                    .append_pair("v", video_id.as_str())
                    .append_pair("lang", lang);
                if generated {
                    url.query_pairs_mut().append_pair("kind", "asr");
                }

                match self
                    .fetch_url(url, None, Some(lang.clone()), Some(generated))
                    .await
                {
                    Ok(fetched) if !fetched.segments.is_empty() => return Ok(fetched),
                    Ok(_) => {}
                    Err(e @ CaptionError::Blocked(_)) => return Err(e),
                    Err(e) => {
                        warn!(video_id = %video_id, lang = %lang, error = %e, "direct timedtext fetch failed");
                        last_error = Some(e);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            CaptionError::NotFound(format!("no timedtext for languages {}", languages.join(",")))
        }))
    }
}

fn check_playability(status: &PlayabilityStatus) -> std::result::Result<(), CaptionError> {
    let reason = status.reason.clone().unwrap_or_default();
    match status.status.as_str() {
        "OK" => Ok(()),
        "LOGIN_REQUIRED" if reason.to_lowercase().contains("bot") => {
            Err(CaptionError::Blocked(reason))
        }
        "LOGIN_REQUIRED" | "AGE_CHECK_REQUIRED" => Err(CaptionError::Blocked(reason)),
        "ERROR" | "UNPLAYABLE" => Err(CaptionError::NotFound(reason)),
        // LIVE_STREAM_OFFLINE and friends still may carry captions
        _ => Ok(()),
    }
}

fn status_error(status: StatusCode) -> CaptionError {
    match status.as_u16() {
        429 | 403 => CaptionError::Blocked(format!("HTTP {status}")),
        404 | 410 => CaptionError::NotFound(format!("HTTP {status}")),
        _ => CaptionError::Network(format!("HTTP {status}")),
    }
}

/// Rebuilds a track url without a forced format and with an optional target language.
fn track_url(base_url: &str, target_language: Option<&str>) -> std::result::Result<Url, CaptionError> {
    let mut url = Url::parse(base_url).map_err(|e| CaptionError::Malformed(e.to_string()))?;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "fmt" && k != "tlang")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (k, v) in &pairs {
            query.append_pair(k, v);
        }
        if let Some(target) = target_language {
            query.append_pair("tlang", target);
        }
    }
    Ok(url)
}

fn extract_between<'a>(haystack: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = haystack.find(start)? + start.len();
    let len = haystack[from..].find(end)?;
    Some(&haystack[from..from + len])
}
