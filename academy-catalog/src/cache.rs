use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

use crate::course::{Course, Subject};

/// Where the catalog is loaded from at start-up.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn load_subjects(&self) -> Result<Vec<Subject>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Read-only snapshot of subjects and courses.
///
/// The catalog changes a few times a year, so it is loaded once and shared.
#[derive(Debug, Clone, Default)]
pub struct CatalogCache {
    subjects: Vec<Subject>,
    subject_index: HashMap<String, usize>,
    course_index: HashMap<String, (usize, usize)>,
    listed: Vec<String>,
}

impl CatalogCache {
    /// `listed` is the default subject order for `subjects()` without ids.
    pub fn new(subjects: Vec<Subject>, listed: Vec<String>) -> Self {
        let mut subject_index = HashMap::new();
        let mut course_index = HashMap::new();

        for (si, subject) in subjects.iter().enumerate() {
            subject_index.insert(subject.id.clone(), si);
            for (ci, course) in subject.courses.iter().enumerate() {
                course_index.insert(course.id.clone(), (si, ci));
            }
        }

        Self {
            subjects,
            subject_index,
            course_index,
            listed,
        }
    }

    pub async fn warmup(
        source: &dyn CatalogSource,
        listed: Vec<String>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let subjects = source.load_subjects().await?;
        let cache = Self::new(subjects, listed);
        info!(
            "Catalog warmed: {} subjects, {} courses",
            cache.subjects.len(),
            cache.course_index.len()
        );
        Ok(cache)
    }

    pub fn get_course_by_id(&self, id: &str) -> Option<&Course> {
        self.course_index
            .get(id)
            .map(|&(si, ci)| &self.subjects[si].courses[ci])
    }

    pub fn get_subject_by_id(&self, id: &str) -> Option<&Subject> {
        self.subject_index.get(id).map(|&si| &self.subjects[si])
    }

    pub fn subject_of(&self, course: &Course) -> Option<&Subject> {
        self.get_subject_by_id(&course.subject_id)
    }

    /// Subjects in the requested order; unknown ids are skipped.
    /// `None` returns the listed subjects.
    pub fn get_subjects(&self, ids: Option<&[String]>) -> Vec<&Subject> {
        let ids = ids.unwrap_or(self.listed.as_slice());
        ids.iter().filter_map(|id| self.get_subject_by_id(id)).collect()
    }

    /// For each subject, its course at `level` if it has one.
    pub fn courses_at_level(&self, subject_ids: &[String], level: i32) -> Vec<&Course> {
        self.get_subjects(Some(subject_ids))
            .into_iter()
            .filter_map(|s| s.course_at_level(level))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: &str, levels: &[i32]) -> Subject {
        Subject {
            id: id.to_string(),
            name: id.to_uppercase(),
            exit_level: *levels.iter().max().unwrap_or(&0),
            courses: levels
                .iter()
                .map(|&level| Course {
                    id: format!("{}_{}", id, level),
                    subject_id: id.to_string(),
                    name: format!("{} {}", id, level),
                    level,
                    capacity: 6,
                    price_in_cents: if level == 0 { 0 } else { 12900 },
                    series_price_in_cents: None,
                })
                .collect(),
        }
    }

    fn cache() -> CatalogCache {
        CatalogCache::new(
            vec![subject("ai", &[0, 1, 2]), subject("sn", &[0, 1]), subject("robo", &[1])],
            vec!["sn".to_string(), "ai".to_string()],
        )
    }

    #[test]
    fn test_lookup_by_id() {
        let cache = cache();
        let course = cache.get_course_by_id("ai_2").unwrap();
        assert_eq!(course.level, 2);
        assert_eq!(cache.subject_of(course).unwrap().id, "ai");
        assert!(cache.get_course_by_id("nope").is_none());
    }

    #[test]
    fn test_default_subjects_are_listed_ones() {
        let cache = cache();
        let ids: Vec<&str> = cache.get_subjects(None).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["sn", "ai"]);
    }

    #[test]
    fn test_courses_at_level_skips_missing() {
        let cache = cache();
        let ids = vec!["ai".to_string(), "robo".to_string(), "sn".to_string()];
        let courses: Vec<&str> = cache.courses_at_level(&ids, 0).iter().map(|c| c.id.as_str()).collect();
        assert_eq!(courses, vec!["ai_0", "sn_0"]);
    }

    struct StaticSource;

    #[async_trait]
    impl CatalogSource for StaticSource {
        async fn load_subjects(&self) -> Result<Vec<Subject>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(vec![subject("ai", &[1])])
        }
    }

    #[tokio::test]
    async fn test_warmup_from_source() {
        let cache = CatalogCache::warmup(&StaticSource, vec!["ai".to_string()]).await.unwrap();
        assert!(!cache.is_empty());
        assert!(cache.get_course_by_id("ai_1").is_some());
    }
}
