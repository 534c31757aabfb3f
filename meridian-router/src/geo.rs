//! Optional geo pre-filter: narrows a candidate list to the providers whose
//! configured region is closest to a supplied client IP, before scoring.
//!
//! Pure and stateless — a no-op whenever the caller has no client IP to
//! offer, so deployments that never pass one see unfiltered candidates
//! exactly as if this module didn't exist.

use crate::alias::Candidate;
use std::collections::HashMap;
use std::net::IpAddr;

/// Coarse regions, deliberately few — this is a pre-filter, not a full geo-IP
/// database. `Unknown` covers any region string config doesn't recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    UsEast,
    UsWest,
    Europe,
    AsiaPacific,
    Unknown,
}

impl Region {
    pub fn from_config_str(value: &str) -> Self {
        match value {
            "us-east" => Region::UsEast,
            "us-west" => Region::UsWest,
            "eu" | "europe" => Region::Europe,
            "ap" | "asia-pacific" => Region::AsiaPacific,
            _ => Region::Unknown,
        }
    }
}

/// A deliberately crude IP-to-region heuristic: a pre-filter, not a geo-IP
/// service, so there is no external database here. Real deployments can
/// replace this with a proper lookup without touching the filtering logic
/// below, which only depends on `Region`.
fn region_of(ip: IpAddr) -> Region {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            match octets[0] {
                3..=50 => Region::UsEast,
                51..=100 => Region::UsWest,
                101..=150 => Region::Europe,
                151..=200 => Region::AsiaPacific,
                _ => Region::Unknown,
            }
        }
        IpAddr::V6(_) => Region::Unknown,
    }
}

pub struct GeoRouter {
    provider_regions: HashMap<String, Region>,
}

impl GeoRouter {
    pub fn new(provider_regions: HashMap<String, Region>) -> Self {
        Self { provider_regions }
    }

    /// Filter `candidates` to those whose provider is registered in the same
    /// region as `client_ip`. If nothing matches, or no client IP was
    /// supplied, returns `candidates` unchanged — this is a narrowing hint,
    /// never a hard exclusion that could empty the candidate list.
    pub fn filter(&self, candidates: Vec<Candidate>, client_ip: Option<IpAddr>) -> Vec<Candidate> {
        let Some(ip) = client_ip else {
            return candidates;
        };
        let target_region = region_of(ip);
        if target_region == Region::Unknown {
            return candidates;
        }

        let narrowed: Vec<Candidate> = candidates
            .iter()
            .filter(|c| self.provider_regions.get(&c.provider_name) == Some(&target_region))
            .cloned()
            .collect();

        if narrowed.is_empty() {
            candidates
        } else {
            narrowed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(provider: &str) -> Candidate {
        Candidate {
            provider_name: provider.to_string(),
            model_id: "m".to_string(),
        }
    }

    #[test]
    fn no_client_ip_is_a_no_op() {
        let router = GeoRouter::new(HashMap::new());
        let candidates = vec![candidate("openai"), candidate("anthropic")];
        let filtered = router.filter(candidates.clone(), None);
        assert_eq!(filtered.len(), candidates.len());
    }

    #[test]
    fn narrows_to_matching_region_when_present() {
        let mut regions = HashMap::new();
        regions.insert("anthropic".to_string(), Region::UsEast);
        regions.insert("openai".to_string(), Region::Europe);
        let router = GeoRouter::new(regions);

        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let filtered = router.filter(vec![candidate("anthropic"), candidate("openai")], Some(ip));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].provider_name, "anthropic");
    }

    #[test]
    fn never_empties_the_candidate_list() {
        let router = GeoRouter::new(HashMap::new());
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let filtered = router.filter(vec![candidate("anthropic")], Some(ip));
        assert_eq!(filtered.len(), 1);
    }
}
