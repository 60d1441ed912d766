//! Quality-label ranking used to synthesize the `best`/`worst` aliases.

/// Fixed weights for conventional non-numeric labels, on the same rough
/// scale as resolution heights.
const SPECIAL_WEIGHTS: &[(&str, f64)] = &[
    ("live", 1080.0),
    ("hd", 1080.0),
    ("hq", 576.0),
    ("sd", 576.0),
    ("sq", 360.0),
    ("mobile", 240.0),
    ("audio", 0.0),
];

/// Weigh a quality label for ranking. Resolution-style labels (`720p`)
/// dominate; bitrate labels (`1500k`) are coarsely scaled down into the same
/// range; a few conventional names carry fixed weights; anything else ranks
/// lowest. A trailing protocol suffix such as `_hls` is ignored.
pub fn quality_weight(label: &str) -> f64 {
    let label = label.strip_suffix("_hls").unwrap_or(label);
    let label = label.to_ascii_lowercase();

    if let Some(res) = label.strip_suffix('p')
        && let Ok(height) = res.parse::<u64>()
    {
        return height as f64;
    }

    if let Some(rate) = label.strip_suffix('k')
        && let Ok(bitrate) = rate.parse::<u64>()
    {
        // Rough mapping from bitrate to a resolution-like scale.
        let bitrate = bitrate as f64;
        return if bitrate > 2000.0 {
            bitrate / 3.4
        } else if bitrate > 1000.0 {
            bitrate / 2.6
        } else {
            bitrate / 1.7
        };
    }

    for (name, weight) in SPECIAL_WEIGHTS {
        if label == *name {
            return *weight;
        }
    }

    -1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1080p", "720p")]
    #[case("720p", "480p")]
    #[case("720p", "1500k")]
    #[case("3000k", "1500k")]
    #[case("hd", "sd")]
    #[case("240p", "unknown")]
    fn higher_quality_outranks_lower(#[case] higher: &str, #[case] lower: &str) {
        assert!(
            quality_weight(higher) > quality_weight(lower),
            "{higher} should outrank {lower}"
        );
    }

    #[test]
    fn protocol_suffix_is_ignored() {
        assert_eq!(quality_weight("720p_hls"), quality_weight("720p"));
    }

    #[test]
    fn unparseable_labels_rank_last() {
        assert!(quality_weight("weird") < quality_weight("audio"));
    }
}
