use crate::domain::recommendation::Recommendation;

/// Include/exclude lists applied after normalization. Exclusion wins over
/// inclusion; an empty include list admits everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecommendationFilter {
    pub include_instance_types: Vec<String>,
    pub exclude_instance_types: Vec<String>,
    pub include_regions: Vec<String>,
    pub exclude_regions: Vec<String>,
}

impl RecommendationFilter {
    pub fn is_empty(&self) -> bool {
        self.include_instance_types.is_empty()
            && self.exclude_instance_types.is_empty()
            && self.include_regions.is_empty()
            && self.exclude_regions.is_empty()
    }

    pub fn allows(&self, recommendation: &Recommendation) -> bool {
        admits(&self.include_instance_types, &self.exclude_instance_types, &recommendation.instance_type)
            && admits(&self.include_regions, &self.exclude_regions, &recommendation.region)
    }

    pub fn apply(&self, recommendations: Vec<Recommendation>) -> Vec<Recommendation> {
        if self.is_empty() {
            return recommendations;
        }
        recommendations.into_iter().filter(|recommendation| self.allows(recommendation)).collect()
    }
}

fn contains(list: &[String], value: &str) -> bool {
    list.iter().any(|entry| entry.trim().eq_ignore_ascii_case(value))
}

fn admits(include: &[String], exclude: &[String], value: &str) -> bool {
    // Region-flexible commitments carry no instance type or region to match on.
    if value.is_empty() {
        return true;
    }
    if contains(exclude, value) {
        return false;
    }
    include.is_empty() || contains(include, value)
}
