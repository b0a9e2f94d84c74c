mod common;

use axum::http::{StatusCode, header};
use common::{
    BrokenEncoder, FAKE_MOVIE, TestApp, body_bytes, body_json, encoded_image, json_request,
    request, upload_request,
};
use image::ImageFormat;
use photo_album::handlers::movie_handlers::MOVIE_CONTENT_TYPE;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

async fn upload(app: &TestApp, token: &str, filename: &str, title: &str) -> serde_json::Value {
    let response = app
        .router
        .clone()
        .oneshot(upload_request(
            token,
            filename,
            &encoded_image(ImageFormat::Jpeg),
            title,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

#[tokio::test]
async fn requests_without_a_valid_token_are_rejected() {
    let app = TestApp::new().await;

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/api/v1/albums/", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/api/v1/albums/", Some("not-a-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn listing_is_open_to_any_authenticated_user() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    upload(&app, &alice.token, "sunset.jpg", "Sunset").await;

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/api/v1/albums/", Some(&bob.token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let photos = body.as_array().unwrap();
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0]["title"], "Sunset");
    assert_eq!(photos[0]["creator"], alice.id);
    assert!(photos[0].get("cropped_image").is_none());
}

#[tokio::test]
async fn upload_stores_original_and_derived_images() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;

    let body = upload(&app, &alice.token, "sunset.jpg", "Sunset").await;

    assert_eq!(body["image"], "/media/uploads/sunset.jpg");
    assert_eq!(body["cropped_image"], "/media/uploads/sunset_1.jpg");
    assert_eq!(body["webp_image"], "/media/uploads/sunset.webp");
    assert_eq!(body["views"], 0);
    assert!(app.media_path("uploads/sunset.jpg").is_file());
    assert!(app.media_path("uploads/sunset_1.jpg").is_file());
    assert!(app.media_path("uploads/sunset.webp").is_file());
}

#[tokio::test]
async fn non_latin_file_names_are_accepted() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;

    let body = upload(&app, &alice.token, "фото.jpg", "Photo").await;

    assert_eq!(body["image"], "/media/uploads/фото.jpg");
    assert_eq!(body["webp_image"], "/media/uploads/фото.webp");
    assert!(std::fs::metadata(app.media_path("uploads/фото_1.jpg")).unwrap().len() > 0);
    assert!(std::fs::metadata(app.media_path("uploads/фото.webp")).unwrap().len() > 0);
}

#[tokio::test]
async fn uploaded_media_is_served() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    upload(&app, &alice.token, "sunset.jpg", "Sunset").await;

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/media/uploads/sunset.webp", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn upload_with_unaccepted_format_is_rejected() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;

    let response = app
        .router
        .clone()
        .oneshot(upload_request(
            &alice.token,
            "drawing.bmp",
            &encoded_image(ImageFormat::Bmp),
            "Drawing",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("Image mime must be:")
    );
    assert!(!app.media_path("uploads/drawing.bmp").exists());
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let jpeg = encoded_image(ImageFormat::Jpeg);
    let app = TestApp::with(jpeg.len() - 1, Arc::new(common::StubEncoder)).await;
    let alice = app.user("alice").await;

    let response = app
        .router
        .clone()
        .oneshot(upload_request(&alice.token, "sunset.jpg", &jpeg, "Sunset"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("Image size must be not more")
    );
}

#[tokio::test]
async fn retrieval_counts_views() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let photo = upload(&app, &alice.token, "sunset.jpg", "Sunset").await;
    let uri = format!("/api/v1/albums/{}/", photo["id"]);

    let first = body_json(
        app.router
            .clone()
            .oneshot(request("GET", &uri, Some(&bob.token)))
            .await
            .unwrap(),
    )
    .await;
    let second = body_json(
        app.router
            .clone()
            .oneshot(request("GET", &uri, Some(&bob.token)))
            .await
            .unwrap(),
    )
    .await;

    let n = first["views"].as_i64().unwrap();
    assert_eq!(second["views"].as_i64().unwrap(), n + 1);
    assert_eq!(app.state.photos.get(photo["id"].as_i64().unwrap()).await.unwrap().views, n + 2);
}

#[tokio::test]
async fn owner_sees_derived_images_others_do_not() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let photo = upload(&app, &alice.token, "sunset.jpg", "Sunset").await;
    let uri = format!("/api/v1/albums/{}/", photo["id"]);

    let own = body_json(
        app.router
            .clone()
            .oneshot(request("GET", &uri, Some(&alice.token)))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(own["webp_image"], "/media/uploads/sunset.webp");

    let other = body_json(
        app.router
            .clone()
            .oneshot(request("GET", &uri, Some(&bob.token)))
            .await
            .unwrap(),
    )
    .await;
    assert!(other.get("webp_image").is_none());
}

#[tokio::test]
async fn missing_photo_is_not_found() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/api/v1/albums/42/", Some(&alice.token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_the_owner_may_edit_or_delete() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let photo = upload(&app, &alice.token, "sunset.jpg", "Sunset").await;
    let uri = format!("/api/v1/albums/{}/", photo["id"]);

    let response = app
        .router
        .clone()
        .oneshot(json_request("PATCH", &uri, &bob.token, json!({"title": "Mine now"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .router
        .clone()
        .oneshot(request("DELETE", &uri, Some(&bob.token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .router
        .clone()
        .oneshot(json_request("PUT", &uri, &alice.token, json!({"title": "Dusk"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["title"], "Dusk");
    // Editing never regenerates the derived images.
    assert_eq!(body["cropped_image"], "/media/uploads/sunset_1.jpg");

    let response = app
        .router
        .clone()
        .oneshot(request("DELETE", &uri, Some(&alice.token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!app.media_path("uploads/sunset.jpg").exists());
    assert!(!app.media_path("uploads/sunset.webp").exists());
}

#[tokio::test]
async fn put_requires_a_title_patch_does_not() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let photo = upload(&app, &alice.token, "sunset.jpg", "Sunset").await;
    let uri = format!("/api/v1/albums/{}/", photo["id"]);

    let response = app
        .router
        .clone()
        .oneshot(json_request("PUT", &uri, &alice.token, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Title is required.");

    let response = app
        .router
        .clone()
        .oneshot(json_request("PATCH", &uri, &alice.token, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["title"], "Sunset");
}

#[tokio::test]
async fn make_movie_issues_a_downloadable_link() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    upload(&app, &alice.token, "sunset.jpg", "Sunset").await;
    upload(&app, &alice.token, "beach.jpg", "Beach").await;

    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/api/v1/albums/make_movie/", Some(&alice.token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({"id": 1, "url": "http://testserver/api/v1/downloads/1/"})
    );
    assert!(app.media_path("videos/movie.webm").is_file());

    // Links stay valid after the first download.
    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(request("GET", "/api/v1/downloads/1/", Some(&alice.token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            MOVIE_CONTENT_TYPE
        );
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"movie.webm\""
        );
        assert_eq!(body_bytes(response).await, FAKE_MOVIE);
    }
}

#[tokio::test]
async fn movies_are_not_served_as_static_media() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    upload(&app, &alice.token, "sunset.jpg", "Sunset").await;

    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/api/v1/albums/make_movie/", Some(&alice.token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(app.media_path("videos/movie.webm").is_file());

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/media/videos/movie.webm", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn second_movie_gets_a_distinct_file() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    upload(&app, &alice.token, "sunset.jpg", "Sunset").await;

    for expected in [1, 2] {
        let response = app
            .router
            .clone()
            .oneshot(request("POST", "/api/v1/albums/make_movie/", Some(&alice.token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["id"], expected);
    }
    assert!(app.media_path("videos/movie.webm").is_file());
    assert!(app.media_path("videos/movie_1.webm").is_file());
}

#[tokio::test]
async fn make_movie_without_photos_is_a_bad_request() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;

    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/api/v1/albums/make_movie/", Some(&alice.token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Photos does not exist");
}

#[tokio::test]
async fn user_movie_only_uses_the_callers_photos() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    upload(&app, &alice.token, "sunset.jpg", "Sunset").await;

    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/api/v1/albums/make_user_movie/", Some(&bob.token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/api/v1/albums/make_user_movie/", Some(&alice.token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn failed_render_leaves_no_link_behind() {
    let app = TestApp::with(1024 * 1024, Arc::new(BrokenEncoder)).await;
    let alice = app.user("alice").await;
    upload(&app, &alice.token, "sunset.jpg", "Sunset").await;

    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/api/v1/albums/make_movie/", Some(&alice.token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/api/v1/downloads/1/", Some(&alice.token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!app.media_path("videos/movie.webm").exists());
}

#[tokio::test]
async fn health_endpoints_respond() {
    let app = TestApp::new().await;

    for uri in ["/healthz", "/readyz"] {
        let response = app
            .router
            .clone()
            .oneshot(request("GET", uri, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }
}
