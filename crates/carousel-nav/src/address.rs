//! Jobs-style addresses and resource fingerprints.
//!
//! Items live in sub-collections ("jobs") addressed as
//! `https://<host>/jobs/<uuid>?index=<n>`. Resource fingerprints embed the
//! same job id (`https://<cdn>/<uuid>/0_<n>.png`), which lets a checkpoint be
//! rebuilt from the fingerprint alone without trusting a lagging address bar.
//!
//! The sub-index parsed here is informational. It restarts at every job
//! boundary and is never used to decide what the driver acts on.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static JOB_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("valid job id pattern")
});

static JOBS_ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://[^/\s]+/jobs/[0-9a-f-]+(?:\?index=\d+)?$")
        .expect("valid jobs address pattern")
});

static RESOURCE_POSITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)/([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})/0_(\d+)(?:_[^/.]*)?\.(?:png|jpe?g|webp)$",
    )
    .expect("valid resource position pattern")
});

/// Job id and sub-index of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPosition {
    pub job_id: String,
    pub index: usize,
}

/// True for `https://<host>/jobs/<id>` with an optional `?index=<n>`.
pub fn is_jobs_address(address: &str) -> bool {
    JOBS_ADDRESS_RE.is_match(address.trim())
}

/// First UUID found anywhere in `text`, lowercased.
pub fn extract_job_id(text: &str) -> Option<String> {
    JOB_ID_RE
        .find(text)
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// `index` query parameter of a jobs address. Defaults to 0 when absent.
pub fn sub_index(address: &str) -> Option<usize> {
    let parsed = Url::parse(address.trim()).ok()?;
    match parsed.query_pairs().find(|(key, _)| key == "index") {
        Some((_, value)) => value.parse().ok(),
        None => Some(0),
    }
}

/// Job id and sub-index from a jobs address.
pub fn parse_jobs_address(address: &str) -> Option<JobPosition> {
    if !is_jobs_address(address) {
        return None;
    }
    Some(JobPosition {
        job_id: extract_job_id(address)?,
        index: sub_index(address)?,
    })
}

/// Job id and sub-index embedded in a resource fingerprint.
pub fn resource_position(resource: &str) -> Option<JobPosition> {
    let normalized = normalize_resource(resource);
    let caps = RESOURCE_POSITION_RE.captures(&normalized)?;
    Some(JobPosition {
        job_id: caps.get(1)?.as_str().to_ascii_lowercase(),
        index: caps.get(2)?.as_str().parse().ok()?,
    })
}

/// Build `<base>/jobs/<job_id>?index=<index>`.
pub fn jobs_address(base: &str, position: &JobPosition) -> String {
    format!(
        "{}/jobs/{}?index={}",
        base.trim_end_matches('/'),
        position.job_id,
        position.index
    )
}

/// Jobs address for the item a fingerprint names.
///
/// `None` when the fingerprint does not carry both the job id and the
/// sub-index. A guessed index would land on the wrong item.
pub fn jobs_address_from_resource(base: &str, resource: &str) -> Option<String> {
    resource_position(resource).map(|position| jobs_address(base, &position))
}

/// Drop query string and fragment from a resource URL.
pub fn normalize_resource(resource: &str) -> String {
    let trimmed = resource.trim();
    match Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = "0f3c2a4e-9b1d-4c7e-8a55-2d6f0e1b3c9a";

    #[test]
    fn recognizes_jobs_addresses() {
        assert!(is_jobs_address(&format!("https://carousel.local/jobs/{JOB}")));
        assert!(is_jobs_address(&format!(
            "https://www.carousel.local/jobs/{JOB}?index=3"
        )));
        assert!(!is_jobs_address("https://carousel.local/imagine"));
        assert!(!is_jobs_address(&format!(
            "https://carousel.local/jobs/{JOB}?type=all"
        )));
    }

    #[test]
    fn parses_sub_index_with_default() {
        let bare = format!("https://carousel.local/jobs/{JOB}");
        assert_eq!(sub_index(&bare), Some(0));
        let pos = parse_jobs_address(&format!("{bare}?index=2")).unwrap();
        assert_eq!(pos.job_id, JOB);
        assert_eq!(pos.index, 2);
    }

    #[test]
    fn builds_address_from_resource_fingerprint() {
        let resource = format!("https://cdn.carousel.local/{JOB}/0_3.png?v=2");
        assert_eq!(
            jobs_address_from_resource("https://carousel.local/", &resource).as_deref(),
            Some(format!("https://carousel.local/jobs/{JOB}?index=3").as_str())
        );
    }

    #[test]
    fn resource_without_position_is_not_derivable() {
        let resource = format!("https://cdn.carousel.local/{JOB}/grid.png");
        assert!(jobs_address_from_resource("https://carousel.local", &resource).is_none());
        assert!(resource_position("not a url").is_none());
    }

    #[test]
    fn normalize_drops_query_and_fragment() {
        assert_eq!(
            normalize_resource(" https://cdn.x/a/0_1.webp?size=large#top "),
            "https://cdn.x/a/0_1.webp"
        );
        assert_eq!(normalize_resource("cdn/a.png?x=1"), "cdn/a.png");
    }
}
