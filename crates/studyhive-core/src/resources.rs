//! Sanitizes study-resource links suggested by the model.
//!
//! Model output is untrusted: entries may be missing fields, carry tracking
//! parameters, duplicate each other, or not be resources at all. Everything
//! that survives is https-only, de-duplicated, and capped at three entries
//! with reputable educational hosts ranked first.

use studyhive_schema::AnswerResource;
use url::Url;

/// Hosts ranked ahead of everything else. Matched against the normalized
/// lowercase host+path key, so `bitesize` catches bbc.co.uk/bitesize pages.
const EDU_ALLOW_LIST: [&str; 10] = [
    "khanacademy.org",
    "britannica.com",
    "wikipedia.org",
    "ck12.org",
    "bitesize",
    "mathsisfun.com",
    "nasa.gov",
    "noaa.gov",
    "mit.edu",
    "harvard.edu",
];

const MAX_RESOURCES: usize = 3;
const MIN_TITLE_CHARS: usize = 3;
const MAX_TITLE_CHARS: usize = 120;
/// Don't back off to a space before this position when truncating a title;
/// it would gut a long single-word title.
const TITLE_BACKOFF_FLOOR: usize = 60;

/// Clean, rank and dedupe a candidate resource list from raw model JSON.
///
/// Returns `None` when the input is not an array or nothing survives.
pub fn sanitize_resources(candidates: &serde_json::Value) -> Option<Vec<AnswerResource>> {
    let items = candidates.as_array()?;

    let mut cleaned: Vec<(String, AnswerResource)> = Vec::new();
    for item in items {
        let Some(obj) = item.as_object() else {
            continue;
        };
        let title = obj.get("title").and_then(|v| v.as_str()).unwrap_or("").trim();
        let raw_url = obj.get("url").and_then(|v| v.as_str()).unwrap_or("").trim();
        let source = obj
            .get("source")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty());

        if title.chars().count() < MIN_TITLE_CHARS {
            continue;
        }
        let url_bytes = raw_url.as_bytes();
        if url_bytes.len() < 8 || !url_bytes[..8].eq_ignore_ascii_case(b"https://") {
            continue;
        }
        let Ok(parsed) = Url::parse(raw_url) else {
            continue;
        };
        let Some(host) = parsed.host_str() else {
            continue;
        };

        let kept_query: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(name, _)| !is_tracking_param(name))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut url = format!(
            "{}{}",
            parsed.origin().ascii_serialization(),
            parsed.path()
        );
        if !kept_query.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(kept_query.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .finish();
            url.push('?');
            url.push_str(&query);
        }

        let source = source
            .map(str::to_string)
            .or_else(|| derive_source(host));

        let key = format!(
            "{}{}",
            host.to_lowercase(),
            parsed.path().trim_end_matches('/')
        );

        cleaned.push((
            key,
            AnswerResource {
                title: truncate_title(title),
                url,
                source,
            },
        ));
    }

    // First occurrence wins.
    let mut seen = std::collections::HashSet::new();
    cleaned.retain(|(key, _)| seen.insert(key.clone()));

    // Allow-listed hosts first; stable otherwise.
    cleaned.sort_by_key(|(key, _)| !is_allow_listed(key));

    let out: Vec<AnswerResource> = cleaned
        .into_iter()
        .take(MAX_RESOURCES)
        .map(|(_, r)| r)
        .collect();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn is_tracking_param(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.starts_with("utm_") || lower.starts_with("ref") || lower.starts_with("fbclid")
}

fn is_allow_listed(key: &str) -> bool {
    EDU_ALLOW_LIST.iter().any(|entry| key.contains(entry))
}

/// Last two dot-separated labels of the hostname, e.g. `khanacademy.org`.
fn derive_source(host: &str) -> Option<String> {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 2 {
        Some(labels[labels.len() - 2..].join("."))
    } else {
        Some(host.to_string())
    }
}

fn truncate_title(title: &str) -> String {
    let chars: Vec<char> = title.chars().collect();
    if chars.len() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let cut: String = chars[..MAX_TITLE_CHARS].iter().collect();
    let end = match cut.rfind(' ') {
        Some(pos) if cut[..pos].chars().count() > TITLE_BACKOFF_FLOOR => pos,
        _ => cut.len(),
    };
    format!("{}…", &cut[..end])
}
