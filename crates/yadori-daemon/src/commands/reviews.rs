//! Review commands.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use yadori_db::queries::reviews;
use yadori_types::events::{RowChange, Table};
use yadori_types::review::{ImageUpload, ReviewDraft, ReviewPatch, ReviewQuery};

use super::{parse, require_id, require_user, session_user, to_value, Result};
use crate::realtime::record;
use crate::rpc::{ClientContext, RpcError};
use crate::{storage, DaemonState};

/// One page of reviews matching the query params.
pub async fn list_reviews(state: &Arc<DaemonState>, params: &Value) -> Result {
    let query: ReviewQuery = parse(params)?;
    let page = {
        let conn = state.db.lock().await;
        reviews::list(&conn, &query)?
    };
    to_value(&page)
}

/// A review with images, comments and like state for the caller.
pub async fn get_review(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let id = require_id(params, "id")?;
    let viewer = session_user(state, client).await?;
    let detail = {
        let conn = state.db.lock().await;
        reviews::get_detail(&conn, id, viewer.as_deref())?
    };
    to_value(&detail)
}

pub async fn create_review(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let user_id = require_user(state, client).await?;
    let draft: ReviewDraft = parse(params)?;

    let review = {
        let conn = state.db.lock().await;
        reviews::insert(&conn, &user_id, draft, yadori_types::now_secs())?
    };

    info!(review_id = review.id, user_id = %user_id, "review posted");
    state
        .feed
        .emit(RowChange::insert(Table::Reviews, record(&review)));
    to_value(&review)
}

/// Partial edit of the caller's review; `id` plus any review fields.
pub async fn update_review(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let user_id = require_user(state, client).await?;
    let id = require_id(params, "id")?;
    let patch: ReviewPatch = parse(params)?;

    let (before, after) = {
        let conn = state.db.lock().await;
        let before = reviews::get_owned(&conn, id, &user_id)?;
        let after = reviews::update(&conn, id, &user_id, patch, yadori_types::now_secs())?;
        (before, after)
    };

    info!(review_id = id, "review edited");
    state
        .feed
        .emit(RowChange::update(Table::Reviews, record(&after), record(&before)));
    to_value(&after)
}

pub async fn delete_review(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let user_id = require_user(state, client).await?;
    let id = require_id(params, "id")?;

    let deleted = {
        let conn = state.db.lock().await;
        reviews::delete(&conn, id, &user_id)?
    };

    info!(review_id = id, "review deleted");
    state
        .feed
        .emit(RowChange::delete(Table::Reviews, record(&deleted)));
    Ok(serde_json::json!({"deleted": true, "id": id}))
}

#[derive(Deserialize)]
struct EncodedImage {
    file_name: String,
    content_type: String,
    /// Standard base64.
    data: String,
}

/// Attach base64-encoded photos to the caller's review.
pub async fn upload_review_images(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let user_id = require_user(state, client).await?;
    let review_id = require_id(params, "review_id")?;
    let images: Vec<EncodedImage> = params
        .get("images")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| RpcError::invalid_params(&e.to_string()))?
        .ok_or_else(|| RpcError::invalid_params("images required"))?;

    let uploads = images
        .into_iter()
        .map(|image| {
            let bytes =
                base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &image.data)
                    .map_err(|e| {
                        RpcError::invalid_params(&format!("{}: {e}", image.file_name))
                    })?;
            Ok(ImageUpload {
                file_name: image.file_name,
                content_type: image.content_type,
                bytes,
            })
        })
        .collect::<std::result::Result<Vec<_>, RpcError>>()?;

    let attached = storage::upload_review_images(state, &user_id, review_id, uploads).await?;
    to_value(&attached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil;
    use serde_json::json;

    fn image(name: &str) -> Value {
        let data =
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"\xff\xd8\xff");
        json!({"file_name": name, "content_type": "image/jpeg", "data": data})
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let state = testutil::state();
        let (mut client, _rx) = testutil::client();
        let user_id = testutil::sign_up(&state, &mut client, "taro").await;

        let created = create_review(
            &state,
            &mut client,
            &json!({
                "address_text": "  東京都杉並区高円寺南 ",
                "rent": 85000,
                "layout": "1K",
                "rating_location": 4,
                "rating_soundproof": 2,
            }),
        )
        .await
        .expect("create");
        assert_eq!(created["address_text"], "東京都杉並区高円寺南");
        assert_eq!(created["user_id"], user_id.as_str());

        let detail = get_review(&state, &mut client, &json!({"id": created["id"]}))
            .await
            .expect("detail");
        assert_eq!(detail["average_rating"], 3.0);
        assert_eq!(detail["author_nickname"], "taro");
        assert_eq!(detail["liked_by_viewer"], false);

        let page = list_reviews(&state, &json!({"search": "高円寺"})).await.expect("list");
        assert_eq!(page["total"], 1);
        let page = list_reviews(&state, &Value::Null).await.expect("list all");
        assert_eq!(page["reviews"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_create_validation_and_auth() {
        let state = testutil::state();
        let (mut client, _rx) = testutil::client();
        let review = json!({"address_text": "x", "rating_location": 3});
        let err = create_review(&state, &mut client, &review)
            .await
            .expect_err("anonymous");
        assert_eq!(testutil::kind(&err), "auth");

        testutil::sign_up(&state, &mut client, "taro").await;
        let err = create_review(&state, &mut client, &json!({"address_text": "渋谷区"}))
            .await
            .expect_err("empty review");
        assert_eq!(testutil::kind(&err), "validation");

        let err = create_review(
            &state,
            &mut client,
            &json!({"address_text": "渋谷区", "rating_location": 6}),
        )
        .await
        .expect_err("out of range");
        assert_eq!(testutil::kind(&err), "validation");
    }

    #[tokio::test]
    async fn test_owner_only_edit_and_delete() {
        let state = testutil::state();
        let (mut owner, _rx) = testutil::client();
        let (mut other, _rx2) = testutil::client();
        testutil::sign_up(&state, &mut owner, "owner").await;
        testutil::sign_up(&state, &mut other, "other").await;
        let id = testutil::post_review(&state, &mut owner, "東京都目黒区").await;

        let err = update_review(&state, &mut other, &json!({"id": id, "pros_text": "静か"}))
            .await
            .expect_err("not owner");
        assert_eq!(testutil::kind(&err), "forbidden");

        let mut feed = state.feed.subscribe();
        let edited = update_review(&state, &mut owner, &json!({"id": id, "pros_text": "静か"}))
            .await
            .expect("edit");
        assert_eq!(edited["pros_text"], "静か");
        assert_eq!(edited["rating_location"], 4);
        let change = feed.try_recv().expect("update change");
        assert_eq!(change.old_record["pros_text"], "");

        let err = delete_review(&state, &mut other, &json!({"id": id}))
            .await
            .expect_err("not owner");
        assert_eq!(testutil::kind(&err), "forbidden");
        delete_review(&state, &mut owner, &json!({"id": id}))
            .await
            .expect("delete");
        let err = get_review(&state, &mut owner, &json!({"id": id}))
            .await
            .expect_err("gone");
        assert_eq!(testutil::kind(&err), "not_found");
    }

    #[tokio::test]
    async fn test_edit_clears_nullable_fields() {
        let state = testutil::state();
        let (mut client, _rx) = testutil::client();
        testutil::sign_up(&state, &mut client, "hanako").await;
        let created = create_review(
            &state,
            &mut client,
            &json!({"address_text": "東京都北区", "rent": 70000,
                    "rating_location": 5, "rating_sunlight": 1}),
        )
        .await
        .expect("create");
        let id = created["id"].as_i64().expect("id");

        let edited = update_review(
            &state,
            &mut client,
            &json!({"id": id, "rent": null, "rating_sunlight": null}),
        )
        .await
        .expect("clear");
        assert_eq!(edited["rent"], Value::Null);
        assert_eq!(edited["rating_sunlight"], Value::Null);
        assert_eq!(edited["rating_location"], 5);

        let detail = get_review(&state, &mut client, &json!({"id": id}))
            .await
            .expect("detail");
        assert_eq!(detail["average_rating"], 5.0);
        assert_eq!(detail["rent"], Value::Null);
    }

    #[tokio::test]
    async fn test_upload_limit_counts_existing() {
        let state = testutil::state();
        let (mut client, _rx) = testutil::client();
        testutil::sign_up(&state, &mut client, "taro").await;
        let id = testutil::post_review(&state, &mut client, "東京都新宿区").await;

        let four: Vec<Value> = (0..4).map(|i| image(&format!("{i}.jpg"))).collect();
        let upload = json!({"review_id": id, "images": four});
        let attached = upload_review_images(&state, &mut client, &upload)
            .await
            .expect("upload");
        assert_eq!(attached.as_array().map(Vec::len), Some(4));
        let url = attached[0]["image_url"].as_str().expect("url");
        assert!(url.starts_with("http://127.0.0.1:8080/storage/review-images/"));
        assert!(url.ends_with(&format!("_{id}_0.jpg")));

        let two = vec![image("a.jpg"), image("b.jpg")];
        let upload = json!({"review_id": id, "images": two});
        let err = upload_review_images(&state, &mut client, &upload)
            .await
            .expect_err("sixth image");
        assert_eq!(testutil::kind(&err), "validation");

        let detail = get_review(&state, &mut client, &json!({"id": id})).await.expect("detail");
        assert_eq!(detail["images"].as_array().map(Vec::len), Some(4));
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_input() {
        let state = testutil::state();
        let (mut owner, _rx) = testutil::client();
        let (mut other, _rx2) = testutil::client();
        testutil::sign_up(&state, &mut owner, "owner").await;
        testutil::sign_up(&state, &mut other, "other").await;
        let id = testutil::post_review(&state, &mut owner, "東京都北区").await;

        let err = upload_review_images(
            &state,
            &mut other,
            &json!({"review_id": id, "images": [image("a.jpg")]}),
        )
        .await
        .expect_err("not owner");
        assert_eq!(testutil::kind(&err), "forbidden");

        let err = upload_review_images(
            &state,
            &mut owner,
            &json!({"review_id": id, "images": [
                {"file_name": "a.jpg", "content_type": "image/jpeg", "data": "!!"},
            ]}),
        )
        .await
        .expect_err("bad base64");
        assert_eq!(err.code, -32602);

        let err = upload_review_images(
            &state,
            &mut owner,
            &json!({"review_id": id, "images": [
                {"file_name": "a.txt", "content_type": "text/plain", "data": ""},
            ]}),
        )
        .await
        .expect_err("not an image");
        assert_eq!(testutil::kind(&err), "validation");
    }
}
