//! Request bodies for the course endpoints.

use garde::Validate;
use serde::Deserialize;

use crate::models::course::{CourseChanges, CourseModeration, Level, Milestone, NewCourse};
use crate::services::courses::NewVideo;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseRequest {
    #[garde(length(chars, min = 5, max = 200))]
    pub title: String,
    #[garde(length(chars, min = 10))]
    pub description: String,
    #[garde(range(min = 0.0))]
    pub price: f64,
    #[serde(default)]
    #[garde(range(min = 0.0, max = 100.0))]
    pub discount: f64,
    #[garde(length(min = 1, max = 100))]
    pub category: String,
    #[garde(skip)]
    pub level: Level,
    #[serde(default)]
    #[garde(url)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub requirements: Vec<String>,
    #[serde(default)]
    #[garde(skip)]
    pub learning_outcomes: Vec<String>,
}

impl From<CreateCourseRequest> for NewCourse {
    fn from(req: CreateCourseRequest) -> Self {
        NewCourse {
            title: req.title.trim().to_string(),
            description: req.description,
            price: req.price,
            discount: req.discount,
            category: req.category.trim().to_string(),
            level: req.level,
            thumbnail: req.thumbnail,
            requirements: req.requirements,
            learning_outcomes: req.learning_outcomes,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourseRequest {
    #[serde(default)]
    #[garde(length(chars, min = 5, max = 200))]
    pub title: Option<String>,
    #[serde(default)]
    #[garde(length(chars, min = 10))]
    pub description: Option<String>,
    #[serde(default)]
    #[garde(range(min = 0.0))]
    pub price: Option<f64>,
    #[serde(default)]
    #[garde(range(min = 0.0, max = 100.0))]
    pub discount: Option<f64>,
    #[serde(default)]
    #[garde(length(min = 1, max = 100))]
    pub category: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub level: Option<Level>,
    #[serde(default)]
    #[garde(url)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub is_published: Option<bool>,
}

impl From<UpdateCourseRequest> for CourseChanges {
    fn from(req: UpdateCourseRequest) -> Self {
        CourseChanges {
            title: req.title.map(|t| t.trim().to_string()),
            description: req.description,
            price: req.price,
            discount: req.discount,
            category: req.category.map(|c| c.trim().to_string()),
            level: req.level,
            thumbnail: req.thumbnail,
            is_published: req.is_published,
        }
    }
}

/// Admin-only course flags.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ModerateCourseRequest {
    #[serde(default)]
    #[garde(skip)]
    pub is_published: Option<bool>,
    #[serde(default)]
    #[garde(skip)]
    pub featured: Option<bool>,
}

impl From<ModerateCourseRequest> for CourseModeration {
    fn from(req: ModerateCourseRequest) -> Self {
        CourseModeration {
            is_published: req.is_published,
            featured: req.featured,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMilestoneRequest {
    #[garde(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    #[garde(skip)]
    pub description: Option<String>,
    #[garde(range(min = 0))]
    pub order: i32,
}

impl From<CreateMilestoneRequest> for Milestone {
    fn from(req: CreateMilestoneRequest) -> Self {
        Milestone::new(req.title, req.description, req.order)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddVideoRequest {
    #[garde(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    #[garde(skip)]
    pub description: Option<String>,
    #[garde(url)]
    pub url: String,
    #[garde(range(min = 0.0))]
    pub duration: f64,
    #[serde(default)]
    #[garde(url)]
    pub thumbnail: Option<String>,
}

impl From<AddVideoRequest> for NewVideo {
    fn from(req: AddVideoRequest) -> Self {
        NewVideo {
            title: req.title,
            description: req.description,
            url: req.url,
            duration: req.duration,
            thumbnail: req.thumbnail,
        }
    }
}
