//! Subcommand implementations

pub mod jobs;
pub mod plan;
pub mod policies;
pub mod scheduler;

use advisor_lib::JobDescriptor;
use std::collections::BTreeMap;

/// Parse `name=value` into a metric pair
pub fn parse_metric(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("metric name missing in '{}'", raw));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", value.trim()))?;
    Ok((name.to_string(), value))
}

/// Parse `job_id:workload[:tag,tag...]` into a batch entry
pub fn parse_job(raw: &str) -> Result<JobDescriptor, String> {
    let mut parts = raw.splitn(3, ':');
    let job_id = parts.next().unwrap_or_default().trim();
    let workload = parts
        .next()
        .map(str::trim)
        .ok_or_else(|| format!("expected job_id:workload, got '{}'", raw))?;
    if job_id.is_empty() || workload.is_empty() {
        return Err(format!("expected job_id:workload, got '{}'", raw));
    }
    let tags = parts
        .next()
        .map(|tags| {
            tags.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(JobDescriptor {
        job_id: job_id.to_string(),
        workload: workload.to_string(),
        tags,
    })
}

/// Collect parsed metric pairs; later duplicates win
pub fn metric_map(pairs: Vec<(String, f64)>) -> BTreeMap<String, f64> {
    pairs.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metric() {
        assert_eq!(parse_metric("cpu_pct=71.5"), Ok(("cpu_pct".to_string(), 71.5)));
        assert_eq!(parse_metric(" p95 = 3 "), Ok(("p95".to_string(), 3.0)));
        assert!(parse_metric("cpu_pct").is_err());
        assert!(parse_metric("=4").is_err());
        assert!(parse_metric("cpu_pct=high").is_err());
    }

    #[test]
    fn test_parse_job() {
        let job = parse_job("j1:web").unwrap();
        assert_eq!(job.job_id, "j1");
        assert_eq!(job.workload, "web");
        assert!(job.tags.is_empty());

        let job = parse_job("j2:etl:nightly, gpu").unwrap();
        assert_eq!(job.tags, vec!["nightly".to_string(), "gpu".to_string()]);

        assert!(parse_job("j3").is_err());
        assert!(parse_job(":web").is_err());
    }

    #[test]
    fn test_metric_map_last_wins() {
        let map = metric_map(vec![("a".to_string(), 1.0), ("a".to_string(), 2.0)]);
        assert_eq!(map.get("a"), Some(&2.0));
    }
}
