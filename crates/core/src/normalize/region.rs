//! Region label normalization.
//!
//! Providers report regions either as codes (`us-east-1`) or as display
//! labels (`US East (N. Virginia)`, `EU (Ireland)`). Resolution order:
//!
//! 1. exact match against [`REGION_LABELS`]
//! 2. pass-through when the input already looks like a code
//! 3. case-insensitive match against [`REGION_LABELS`]
//! 4. substring match against [`REGION_KEYWORDS`]
//! 5. the input, unchanged
//!
//! Step 2 precedes the fuzzy steps so codes always round-trip unchanged.

pub const REGION_LABELS: &[(&str, &str)] = &[
    ("US East (N. Virginia)", "us-east-1"),
    ("US East (Ohio)", "us-east-2"),
    ("US West (N. California)", "us-west-1"),
    ("US West (Oregon)", "us-west-2"),
    ("AWS GovCloud (US-East)", "us-gov-east-1"),
    ("AWS GovCloud (US-West)", "us-gov-west-1"),
    ("AWS GovCloud (US)", "us-gov-west-1"),
    ("Africa (Cape Town)", "af-south-1"),
    ("Asia Pacific (Hong Kong)", "ap-east-1"),
    ("Asia Pacific (Mumbai)", "ap-south-1"),
    ("Asia Pacific (Hyderabad)", "ap-south-2"),
    ("Asia Pacific (Tokyo)", "ap-northeast-1"),
    ("Asia Pacific (Seoul)", "ap-northeast-2"),
    ("Asia Pacific (Osaka)", "ap-northeast-3"),
    ("Asia Pacific (Osaka-Local)", "ap-northeast-3"),
    ("Asia Pacific (Singapore)", "ap-southeast-1"),
    ("Asia Pacific (Sydney)", "ap-southeast-2"),
    ("Asia Pacific (Jakarta)", "ap-southeast-3"),
    ("Asia Pacific (Melbourne)", "ap-southeast-4"),
    ("Canada (Central)", "ca-central-1"),
    ("Canada West (Calgary)", "ca-west-1"),
    ("Europe (Frankfurt)", "eu-central-1"),
    ("Europe (Zurich)", "eu-central-2"),
    ("Europe (Ireland)", "eu-west-1"),
    ("Europe (London)", "eu-west-2"),
    ("Europe (Paris)", "eu-west-3"),
    ("Europe (Milan)", "eu-south-1"),
    ("Europe (Spain)", "eu-south-2"),
    ("Europe (Stockholm)", "eu-north-1"),
    ("EU (Frankfurt)", "eu-central-1"),
    ("EU (Ireland)", "eu-west-1"),
    ("EU (London)", "eu-west-2"),
    ("EU (Paris)", "eu-west-3"),
    ("EU (Milan)", "eu-south-1"),
    ("EU (Stockholm)", "eu-north-1"),
    ("Israel (Tel Aviv)", "il-central-1"),
    ("Middle East (Bahrain)", "me-south-1"),
    ("Middle East (UAE)", "me-central-1"),
    ("South America (Sao Paulo)", "sa-east-1"),
    ("South America (São Paulo)", "sa-east-1"),
];

/// Ordered: more specific fragments precede fragments they contain.
pub const REGION_KEYWORDS: &[(&str, &str)] = &[
    ("govcloud (us-east)", "us-gov-east-1"),
    ("govcloud", "us-gov-west-1"),
    ("n. virginia", "us-east-1"),
    ("virginia", "us-east-1"),
    ("ohio", "us-east-2"),
    ("n. california", "us-west-1"),
    ("california", "us-west-1"),
    ("oregon", "us-west-2"),
    ("cape town", "af-south-1"),
    ("hong kong", "ap-east-1"),
    ("hyderabad", "ap-south-2"),
    ("mumbai", "ap-south-1"),
    ("tokyo", "ap-northeast-1"),
    ("seoul", "ap-northeast-2"),
    ("osaka", "ap-northeast-3"),
    ("singapore", "ap-southeast-1"),
    ("sydney", "ap-southeast-2"),
    ("jakarta", "ap-southeast-3"),
    ("melbourne", "ap-southeast-4"),
    ("calgary", "ca-west-1"),
    ("canada", "ca-central-1"),
    ("frankfurt", "eu-central-1"),
    ("zurich", "eu-central-2"),
    ("ireland", "eu-west-1"),
    ("london", "eu-west-2"),
    ("paris", "eu-west-3"),
    ("milan", "eu-south-1"),
    ("spain", "eu-south-2"),
    ("stockholm", "eu-north-1"),
    ("tel aviv", "il-central-1"),
    ("bahrain", "me-south-1"),
    ("uae", "me-central-1"),
    ("sao paulo", "sa-east-1"),
    ("são paulo", "sa-east-1"),
];

pub fn normalize_region(label: &str) -> String {
    if let Some((_, code)) = REGION_LABELS.iter().find(|(known, _)| *known == label) {
        return (*code).to_string();
    }

    if looks_like_region_code(label) {
        return label.to_string();
    }

    if let Some((_, code)) =
        REGION_LABELS.iter().find(|(known, _)| known.eq_ignore_ascii_case(label.trim()))
    {
        return (*code).to_string();
    }

    let lowered = label.to_lowercase();
    if let Some((_, code)) =
        REGION_KEYWORDS.iter().find(|(fragment, _)| lowered.contains(fragment))
    {
        return (*code).to_string();
    }

    label.to_string()
}

/// All-lowercase, hyphenated, and free of spaces and parentheses.
pub fn looks_like_region_code(value: &str) -> bool {
    !value.is_empty()
        && value.contains('-')
        && !value.chars().any(|ch| ch.is_uppercase() || ch.is_whitespace() || ch == '(' || ch == ')')
}
