use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::UserSummary;

/// Difficulty level of a course.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "course_level")]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    #[postgres(name = "beginner")]
    Beginner,
    #[postgres(name = "intermediate")]
    Intermediate,
    #[postgres(name = "advanced")]
    Advanced,
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Level::Beginner),
            "intermediate" => Ok(Level::Intermediate),
            "advanced" => Ok(Level::Advanced),
            other => Err(format!("unknown level: {}", other)),
        }
    }
}

/// A video lesson inside a milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub url: String,
    /// Length in seconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub is_published: bool,
    pub order: i32,
}

/// An assignment attached to a milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub total_marks: i32,
    #[serde(default)]
    pub submissions: Vec<Uuid>,
}

/// An ordered section of a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub order: i32,
    #[serde(default)]
    pub videos: Vec<Video>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub is_published: bool,
}

impl Milestone {
    pub fn new(title: String, description: Option<String>, order: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            description,
            order,
            videos: Vec::new(),
            assignments: Vec::new(),
            is_published: false,
        }
    }

    /// The order the next appended video receives.
    pub fn next_video_order(&self) -> i32 {
        self.videos.iter().map(|v| v.order + 1).max().unwrap_or(0)
    }
}

/// Inserts a milestone keeping the list sorted by `order`.
///
/// Milestones sharing an order keep insertion order.
pub fn insert_milestone(milestones: &mut Vec<Milestone>, milestone: Milestone) {
    let position = milestones
        .iter()
        .position(|m| m.order > milestone.order)
        .unwrap_or(milestones.len());
    milestones.insert(position, milestone);
}

/// Price after the percentage discount.
pub fn discounted_price(price: f64, discount: f64) -> f64 {
    price - (price * discount / 100.0)
}

/// A course as exposed by the API.
///
/// `S` is the representation of enrolled students: plain ids in listings,
/// populated summaries on the detail endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseView<S> {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub instructor: UserSummary,
    pub price: f64,
    pub discount: f64,
    pub discounted_price: f64,
    pub category: String,
    pub level: Level,
    pub thumbnail: Option<String>,
    pub milestones: Vec<Milestone>,
    pub students_enrolled: Vec<S>,
    pub rating: f64,
    pub total_reviews: i32,
    pub is_published: bool,
    pub featured: bool,
    pub requirements: Vec<String>,
    pub learning_outcomes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing form.
pub type Course = CourseView<Uuid>;

/// Detail form with populated students, the value held in the course cache.
pub type CourseDetail = CourseView<UserSummary>;

impl<S> CourseView<S> {
    /// Swaps the student representation, keeping everything else.
    pub fn with_students<T>(self, students_enrolled: Vec<T>) -> CourseView<T> {
        CourseView {
            id: self.id,
            title: self.title,
            description: self.description,
            instructor: self.instructor,
            price: self.price,
            discount: self.discount,
            discounted_price: self.discounted_price,
            category: self.category,
            level: self.level,
            thumbnail: self.thumbnail,
            milestones: self.milestones,
            students_enrolled,
            rating: self.rating,
            total_reviews: self.total_reviews,
            is_published: self.is_published,
            featured: self.featured,
            requirements: self.requirements,
            learning_outcomes: self.learning_outcomes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Fields accepted when creating a course.
#[derive(Debug, Clone)]
pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub discount: f64,
    pub category: String,
    pub level: Level,
    pub thumbnail: Option<String>,
    pub requirements: Vec<String>,
    pub learning_outcomes: Vec<String>,
}

/// Fields an owner may change. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct CourseChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub discount: Option<f64>,
    pub category: Option<String>,
    pub level: Option<Level>,
    pub thumbnail: Option<String>,
    pub is_published: Option<bool>,
}

/// Fields only an admin may change.
#[derive(Debug, Clone, Default)]
pub struct CourseModeration {
    pub is_published: Option<bool>,
    pub featured: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milestone(title: &str, order: i32) -> Milestone {
        Milestone::new(title.to_string(), None, order)
    }

    #[test]
    fn discount_is_a_percentage() {
        assert_eq!(discounted_price(200.0, 25.0), 150.0);
        assert_eq!(discounted_price(99.0, 0.0), 99.0);
        assert_eq!(discounted_price(50.0, 100.0), 0.0);
    }

    #[test]
    fn milestones_stay_sorted_by_order() {
        let mut milestones = vec![milestone("intro", 0), milestone("advanced", 5)];
        insert_milestone(&mut milestones, milestone("middle", 2));
        insert_milestone(&mut milestones, milestone("also-middle", 2));
        insert_milestone(&mut milestones, milestone("last", 9));

        let titles: Vec<_> = milestones.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, ["intro", "middle", "also-middle", "advanced", "last"]);
    }

    #[test]
    fn next_video_order_follows_the_highest() {
        let mut m = milestone("intro", 0);
        assert_eq!(m.next_video_order(), 0);

        m.videos.push(Video {
            id: Uuid::new_v4(),
            title: "welcome".to_string(),
            description: None,
            url: "https://cdn.example.com/v.mp4".to_string(),
            duration: 30.0,
            thumbnail: None,
            is_published: false,
            order: 3,
        });
        assert_eq!(m.next_video_order(), 4);
    }

    #[test]
    fn milestones_tolerate_missing_optional_fields() {
        let raw = format!(
            r#"[{{"id":"{}","title":"Basics","order":1}}]"#,
            Uuid::new_v4()
        );
        let parsed: Vec<Milestone> = serde_json::from_str(&raw).unwrap();
        assert!(parsed[0].videos.is_empty());
        assert!(!parsed[0].is_published);
    }
}
