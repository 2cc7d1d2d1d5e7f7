//! Review structures, the rating aggregate and review form validation.

use serde::{Deserialize, Deserializer, Serialize};

use crate::social::CommentWithAuthor;
use crate::{
    ImageId, ReviewId, UserId, ValidationError, MAX_IMAGE_BYTES, MAX_REVIEW_IMAGES, RATING_MAX,
    RATING_MIN,
};

/// The four optional 1-5 star sub-ratings of a review.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct Ratings {
    #[serde(default)]
    pub rating_location: Option<u8>,
    #[serde(default)]
    pub rating_sunlight: Option<u8>,
    #[serde(default)]
    pub rating_soundproof: Option<u8>,
    #[serde(default)]
    pub rating_environment: Option<u8>,
}

impl Ratings {
    pub fn new(
        location: Option<u8>,
        sunlight: Option<u8>,
        soundproof: Option<u8>,
        environment: Option<u8>,
    ) -> Self {
        Self {
            rating_location: location,
            rating_sunlight: sunlight,
            rating_soundproof: soundproof,
            rating_environment: environment,
        }
    }

    /// The non-null sub-ratings in column order.
    pub fn values(&self) -> impl Iterator<Item = u8> {
        [
            self.rating_location,
            self.rating_sunlight,
            self.rating_soundproof,
            self.rating_environment,
        ]
        .into_iter()
        .flatten()
    }

    /// Mean of the non-null sub-ratings, `None` when all are null.
    ///
    /// This is the only place the average rating is computed; every list,
    /// detail and stats view goes through it.
    pub fn average(&self) -> Option<f64> {
        let (sum, count) = self
            .values()
            .fold((0u32, 0u32), |(s, c), v| (s + u32::from(v), c + 1));
        if count == 0 {
            None
        } else {
            Some(f64::from(sum) / f64::from(count))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values().next().is_none()
    }

    /// Every present rating must lie in 1..=5.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("rating_location", self.rating_location),
            ("rating_sunlight", self.rating_sunlight),
            ("rating_soundproof", self.rating_soundproof),
            ("rating_environment", self.rating_environment),
        ];
        for (field, value) in fields {
            if let Some(v) = value {
                if !(RATING_MIN..=RATING_MAX).contains(&v) {
                    return Err(ValidationError::OutOfRange {
                        field,
                        min: i64::from(RATING_MIN),
                        max: i64::from(RATING_MAX),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Mean over every non-null sub-rating of every review (site statistics).
pub fn overall_average<'a>(ratings: impl IntoIterator<Item = &'a Ratings>) -> Option<f64> {
    let (sum, count) = ratings
        .into_iter()
        .flat_map(|r| r.values())
        .fold((0u64, 0u64), |(s, c), v| (s + u64::from(v), c + 1));
    if count == 0 {
        None
    } else {
        Some(sum as f64 / count as f64)
    }
}

/// A row of the `reviews` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct Review {
    pub id: ReviewId,
    pub user_id: UserId,
    pub address_text: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub rent: Option<i64>,
    pub layout: String,
    pub period_lived: String,
    pub pros_text: String,
    pub cons_text: String,
    #[serde(flatten)]
    pub ratings: Ratings,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Review {
    pub fn average_rating(&self) -> Option<f64> {
        self.ratings.average()
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// Review form contents, used for both posting and editing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct ReviewDraft {
    pub address_text: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub rent: Option<i64>,
    #[serde(default)]
    pub layout: String,
    #[serde(default)]
    pub period_lived: String,
    #[serde(default)]
    pub pros_text: String,
    #[serde(default)]
    pub cons_text: String,
    #[serde(flatten)]
    pub ratings: Ratings,
}

impl ReviewDraft {
    /// Trim text fields and apply the form rules: the address is required,
    /// and at least one rating or a pros/cons text must be present.
    pub fn normalized(self) -> Result<Self, ValidationError> {
        let draft = Self {
            address_text: self.address_text.trim().to_string(),
            layout: self.layout.trim().to_string(),
            period_lived: self.period_lived.trim().to_string(),
            pros_text: self.pros_text.trim().to_string(),
            cons_text: self.cons_text.trim().to_string(),
            ..self
        };

        if draft.address_text.is_empty() {
            return Err(ValidationError::Required("address_text"));
        }
        draft.ratings.validate()?;
        if draft.ratings.is_empty() && draft.pros_text.is_empty() && draft.cons_text.is_empty() {
            return Err(ValidationError::EmptyReview);
        }
        if matches!(draft.rent, Some(r) if r < 0) {
            return Err(ValidationError::OutOfRange {
                field: "rent",
                min: 0,
                max: i64::MAX,
            });
        }
        if matches!(draft.latitude, Some(lat) if !(-90.0..=90.0).contains(&lat)) {
            return Err(ValidationError::Invalid("latitude"));
        }
        if matches!(draft.longitude, Some(lon) if !(-180.0..=180.0).contains(&lon)) {
            return Err(ValidationError::Invalid("longitude"));
        }
        Ok(draft)
    }
}

/// Partial review edit; absent fields keep their stored value. On the
/// nullable columns an explicit `null` clears the value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct ReviewPatch {
    #[serde(default)]
    pub address_text: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub latitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub longitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub rent: Option<Option<i64>>,
    #[serde(default)]
    pub layout: Option<String>,
    #[serde(default)]
    pub period_lived: Option<String>,
    #[serde(default)]
    pub pros_text: Option<String>,
    #[serde(default)]
    pub cons_text: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub rating_location: Option<Option<u8>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub rating_sunlight: Option<Option<u8>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub rating_soundproof: Option<Option<u8>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub rating_environment: Option<Option<u8>>,
}

/// A present field, `null` included, becomes `Some`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ReviewPatch {
    /// Overlay the patch on a stored review, yielding the draft to validate.
    pub fn apply(self, review: &Review) -> ReviewDraft {
        let stored = &review.ratings;
        ReviewDraft {
            address_text: self
                .address_text
                .unwrap_or_else(|| review.address_text.clone()),
            latitude: self.latitude.unwrap_or(review.latitude),
            longitude: self.longitude.unwrap_or(review.longitude),
            rent: self.rent.unwrap_or(review.rent),
            layout: self.layout.unwrap_or_else(|| review.layout.clone()),
            period_lived: self
                .period_lived
                .unwrap_or_else(|| review.period_lived.clone()),
            pros_text: self.pros_text.unwrap_or_else(|| review.pros_text.clone()),
            cons_text: self.cons_text.unwrap_or_else(|| review.cons_text.clone()),
            ratings: Ratings {
                rating_location: self.rating_location.unwrap_or(stored.rating_location),
                rating_sunlight: self.rating_sunlight.unwrap_or(stored.rating_sunlight),
                rating_soundproof: self.rating_soundproof.unwrap_or(stored.rating_soundproof),
                rating_environment: self.rating_environment.unwrap_or(stored.rating_environment),
            },
        }
    }
}

/// A row of the `review_images` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct ReviewImage {
    pub id: ImageId,
    pub review_id: ReviewId,
    pub image_url: String,
    pub created_at: u64,
}

/// A review as shown in list views.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct ReviewSummary {
    #[serde(flatten)]
    pub review: Review,
    pub author_nickname: String,
    pub first_image_url: Option<String>,
    pub like_count: u64,
    pub comment_count: u64,
    pub average_rating: Option<f64>,
}

/// A review with everything the detail view shows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct ReviewDetail {
    #[serde(flatten)]
    pub review: Review,
    pub author_nickname: String,
    pub images: Vec<ReviewImage>,
    pub comments: Vec<CommentWithAuthor>,
    pub like_count: u64,
    pub liked_by_viewer: bool,
    pub average_rating: Option<f64>,
}

/// Sort keys for review listings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSort {
    #[default]
    Newest,
    Oldest,
    RentLow,
    RentHigh,
    Rating,
}

/// List/search parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct ReviewQuery {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
    /// Case-insensitive substring of the address.
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: ReviewSort,
    #[serde(default)]
    pub min_rent: Option<i64>,
    #[serde(default)]
    pub max_rent: Option<i64>,
    #[serde(default)]
    pub layout: Option<String>,
    #[serde(default)]
    pub min_rating: Option<f64>,
    #[serde(default)]
    pub has_images: Option<bool>,
    /// Restrict to one author (profile view).
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// One page of a review listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct ReviewPage {
    pub reviews: Vec<ReviewSummary>,
    /// Matching rows before limit/offset.
    pub total: u64,
}

/// Home screen counters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct SiteStats {
    pub total_reviews: u64,
    pub total_users: u64,
    pub average_rating: Option<f64>,
}

/// A photo chosen in the review form, before upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    /// File extension taken from the file name, else from the content type.
    pub fn extension(&self) -> String {
        if let Some((_, ext)) = self.file_name.rsplit_once('.') {
            if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                return ext.to_ascii_lowercase();
            }
        }
        match self.content_type.as_str() {
            "image/jpeg" => "jpg".to_string(),
            "image/png" => "png".to_string(),
            "image/webp" => "webp".to_string(),
            "image/heic" => "heic".to_string(),
            "image/gif" => "gif".to_string(),
            _ => "bin".to_string(),
        }
    }
}

/// Photos selected for one review, counting the ones already attached.
#[derive(Clone, Debug, Default)]
pub struct ImageSet {
    existing: usize,
    pending: Vec<ImageUpload>,
}

impl ImageSet {
    /// A set for a review that already has `existing` images.
    pub fn with_existing(existing: usize) -> Self {
        Self {
            existing,
            pending: Vec::new(),
        }
    }

    /// Add a photo, refusing non-images, oversized files and a 6th image.
    pub fn try_add(&mut self, image: ImageUpload) -> Result<(), ValidationError> {
        if self.remaining() == 0 {
            return Err(ValidationError::TooManyImages(MAX_REVIEW_IMAGES));
        }
        if !image.content_type.starts_with("image/") {
            return Err(ValidationError::NotAnImage(image.content_type));
        }
        if image.bytes.len() > MAX_IMAGE_BYTES {
            return Err(ValidationError::ImageTooLarge(MAX_IMAGE_BYTES));
        }
        self.pending.push(image);
        Ok(())
    }

    /// How many more photos may be added.
    pub fn remaining(&self) -> usize {
        MAX_REVIEW_IMAGES.saturating_sub(self.existing + self.pending.len())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn into_uploads(self) -> Vec<ImageUpload> {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(size: usize) -> ImageUpload {
        ImageUpload {
            file_name: "room.JPG".to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: vec![0u8; size],
        }
    }

    #[test]
    fn test_average_of_present_ratings() {
        let ratings = Ratings::new(Some(4), None, Some(2), None);
        assert_eq!(ratings.average(), Some(3.0));

        let all = Ratings::new(Some(5), Some(4), Some(3), Some(3));
        assert_eq!(all.average(), Some(3.75));
    }

    #[test]
    fn test_average_undefined_when_all_null() {
        assert_eq!(Ratings::default().average(), None);
        assert!(Ratings::default().is_empty());
    }

    #[test]
    fn test_overall_average_flattens_reviews() {
        let a = Ratings::new(Some(5), None, None, None);
        let b = Ratings::new(Some(1), Some(3), None, None);
        let c = Ratings::default();
        assert_eq!(overall_average([&a, &b, &c]), Some(3.0));
        assert_eq!(overall_average([&c]), None);
    }

    #[test]
    fn test_rating_range() {
        assert!(Ratings::new(Some(0), None, None, None).validate().is_err());
        assert!(Ratings::new(None, Some(6), None, None).validate().is_err());
        assert!(Ratings::new(Some(1), Some(5), None, None).validate().is_ok());
    }

    #[test]
    fn test_draft_requires_address() {
        let draft = ReviewDraft {
            address_text: "   ".to_string(),
            pros_text: "静か".to_string(),
            ..Default::default()
        };
        assert_eq!(
            draft.normalized(),
            Err(ValidationError::Required("address_text"))
        );
    }

    #[test]
    fn test_draft_requires_rating_or_text() {
        let draft = ReviewDraft {
            address_text: "渋谷区神南1-2-3".to_string(),
            pros_text: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(draft.normalized(), Err(ValidationError::EmptyReview));

        let rated = ReviewDraft {
            address_text: " 渋谷区神南1-2-3 ".to_string(),
            ratings: Ratings::new(None, Some(4), None, None),
            ..Default::default()
        }
        .normalized()
        .expect("one rating is enough");
        assert_eq!(rated.address_text, "渋谷区神南1-2-3");
    }

    #[test]
    fn test_draft_rejects_negative_rent() {
        let draft = ReviewDraft {
            address_text: "中野".to_string(),
            cons_text: "狭い".to_string(),
            rent: Some(-1),
            ..Default::default()
        };
        assert!(matches!(
            draft.normalized(),
            Err(ValidationError::OutOfRange { field: "rent", .. })
        ));
    }

    #[test]
    fn test_review_ratings_flatten_into_columns() {
        let draft = ReviewDraft {
            address_text: "目黒".to_string(),
            ratings: Ratings::new(Some(3), None, None, None),
            ..Default::default()
        };
        let json = serde_json::to_value(&draft).expect("serialize");
        assert_eq!(json["rating_location"], 3);
        assert!(json["rating_sunlight"].is_null());
    }

    #[test]
    fn test_patch_keeps_unset_fields() {
        let review = Review {
            id: 1,
            user_id: "u".to_string(),
            address_text: "杉並区".to_string(),
            latitude: Some(35.7),
            longitude: Some(139.6),
            rent: Some(80_000),
            layout: "1K".to_string(),
            period_lived: "2年".to_string(),
            pros_text: "静か".to_string(),
            cons_text: String::new(),
            ratings: Ratings::new(Some(4), None, None, None),
            created_at: 10,
            updated_at: 10,
        };
        let draft = ReviewPatch {
            rent: Some(Some(75_000)),
            rating_sunlight: Some(Some(2)),
            ..Default::default()
        }
        .apply(&review);

        assert_eq!(draft.address_text, "杉並区");
        assert_eq!(draft.rent, Some(75_000));
        assert_eq!(draft.layout, "1K");
        assert_eq!(draft.ratings, Ratings::new(Some(4), Some(2), None, None));

        let patch: ReviewPatch =
            serde_json::from_value(serde_json::json!({"rent": null, "rating_location": null}))
                .expect("patch");
        assert_eq!(patch.rent, Some(None));
        assert_eq!(patch.latitude, None);
        let draft = patch.apply(&review);
        assert_eq!(draft.rent, None);
        assert_eq!(draft.latitude, Some(35.7));
        assert_eq!(draft.ratings, Ratings::default());
    }

    #[test]
    fn test_image_set_refuses_sixth_image() {
        let mut set = ImageSet::with_existing(5);
        assert_eq!(set.remaining(), 0);
        assert_eq!(
            set.try_add(jpeg(10)),
            Err(ValidationError::TooManyImages(MAX_REVIEW_IMAGES))
        );

        let mut set = ImageSet::default();
        for _ in 0..5 {
            set.try_add(jpeg(10)).expect("within limit");
        }
        assert!(set.try_add(jpeg(10)).is_err());
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn test_image_set_refuses_non_images_and_large_files() {
        let mut set = ImageSet::default();
        let pdf = ImageUpload {
            file_name: "lease.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            bytes: vec![1],
        };
        assert!(matches!(set.try_add(pdf), Err(ValidationError::NotAnImage(_))));
        assert_eq!(
            set.try_add(jpeg(MAX_IMAGE_BYTES + 1)),
            Err(ValidationError::ImageTooLarge(MAX_IMAGE_BYTES))
        );
        assert!(set.is_empty());
    }

    #[test]
    fn test_image_extension() {
        assert_eq!(jpeg(1).extension(), "jpg");
        let unnamed = ImageUpload {
            file_name: "blob".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![],
        };
        assert_eq!(unnamed.extension(), "png");
    }
}
