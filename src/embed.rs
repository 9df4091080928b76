//! Third-party streaming embed URLs. Pure templating, no requests are made.
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::catalog::ContentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamServer {
    #[default]
    Smashy,
    MultiEmbed,
    VidSrc,
}

impl StreamServer {
    pub const ALL: [StreamServer; 3] = [
        StreamServer::Smashy,
        StreamServer::MultiEmbed,
        StreamServer::VidSrc,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StreamServer::Smashy => "Smashy",
            StreamServer::MultiEmbed => "MultiEmbed",
            StreamServer::VidSrc => "VidSrc",
        }
    }
}

impl FromStr for StreamServer {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "smashy" | "server1" => Ok(StreamServer::Smashy),
            "multiembed" | "server2" => Ok(StreamServer::MultiEmbed),
            "vidsrc" | "server3" => Ok(StreamServer::VidSrc),
            _ => Err(anyhow::anyhow!("unknown stream server '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRef {
    pub season: u32,
    pub episode: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedLink {
    pub server: StreamServer,
    pub label: &'static str,
    pub url: String,
}

pub fn embed_url(
    server: StreamServer,
    id: i64,
    kind: ContentKind,
    episode: Option<EpisodeRef>,
) -> String {
    match kind {
        ContentKind::Movie => match server {
            StreamServer::Smashy => format!("https://player.smashy.stream/movie/{id}"),
            StreamServer::MultiEmbed => format!("https://multiembed.mov/?video_id={id}&tmdb=1"),
            StreamServer::VidSrc => format!("https://vidsrc.xyz/embed/movie/{id}"),
        },
        ContentKind::Tv => {
            // Shows open on their first episode unless told otherwise.
            let EpisodeRef { season, episode } = episode.unwrap_or(EpisodeRef {
                season: 1,
                episode: 1,
            });
            match server {
                StreamServer::Smashy => {
                    format!("https://player.smashy.stream/tv/{id}?s={season}&e={episode}")
                }
                StreamServer::MultiEmbed => {
                    format!("https://multiembed.mov/?video_id={id}&tmdb=1&s={season}&e={episode}")
                }
                StreamServer::VidSrc => {
                    format!("https://vidsrc.xyz/embed/tv/{id}?s={season}&e={episode}")
                }
            }
        }
    }
}

pub fn embed_links(id: i64, kind: ContentKind, episode: Option<EpisodeRef>) -> Vec<EmbedLink> {
    StreamServer::ALL
        .iter()
        .map(|&server| EmbedLink {
            server,
            label: server.label(),
            url: embed_url(server, id, kind, episode),
        })
        .collect()
}
