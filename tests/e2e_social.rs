//! E2E tests for the follow graph, engagement, feeds and notifications

mod common;

use common::TestServer;
use serde_json::{Value, json};

#[tokio::test]
async fn test_follow_toggle_updates_counts_and_notifies() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let bob = server.create_user("bob").await;

    let path = format!("/profiles/{}/follow", alice.account_id);

    // Self-follow from registration counts as one follower
    let response = server.post(&path, &bob).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["following"], true);
    assert_eq!(body["follower_count"], 2);

    let page = server
        .get_json(&format!("/profiles/{}", alice.account_id), &bob)
        .await;
    assert_eq!(page["profile"]["followed_by_viewer"], true);
    assert_eq!(page["profile"]["follower_count"], 2);

    let response = server.post(&path, &bob).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["following"], false);
    assert_eq!(body["follower_count"], 1);

    let notifications = server.get_json("/notifications", &alice).await;
    let kinds: Vec<&str> = notifications
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["unfollow", "follow"]);
    assert_eq!(notifications[0]["actor_username"], "bob");
}

#[tokio::test]
async fn test_follow_unknown_account_is_not_found() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;

    let response = server.post("/profiles/missing/follow", &alice).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_like_and_save_toggles() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let bob = server.create_user("bob").await;

    let post = server.create_post(&alice, "Hello", "first post").await;
    let post_id = post["id"].as_str().unwrap();
    assert_eq!(post["like_count"], 0);
    assert_eq!(post["username"], "alice");

    let like_path = format!("/posts/{}/like", post_id);
    let body: Value = server.post(&like_path, &bob).await.json().await.unwrap();
    assert_eq!(body, json!({ "active": true, "count": 1 }));
    let body: Value = server.post(&like_path, &bob).await.json().await.unwrap();
    assert_eq!(body, json!({ "active": false, "count": 0 }));

    // Only the first like produced a notification
    let summary = server.get_json("/notifications/summary", &alice).await;
    assert_eq!(summary["unread_count"], 1);
    assert_eq!(summary["latest"][0]["kind"], "like");
    assert_eq!(summary["latest"][0]["post_title"], "Hello");

    // Saving never notifies
    let save_path = format!("/posts/{}/save", post_id);
    let body: Value = server.post(&save_path, &bob).await.json().await.unwrap();
    assert_eq!(body["active"], true);

    let saved = server.get_json("/saved", &bob).await;
    assert_eq!(saved.as_array().unwrap().len(), 1);
    assert_eq!(saved[0]["id"], post_id);
    assert_eq!(saved[0]["saved"], true);
    assert!(saved[0]["saved_at"].is_string());

    let summary = server.get_json("/notifications/summary", &alice).await;
    assert_eq!(summary["unread_count"], 1);

    server.post(&save_path, &bob).await;
    let saved = server.get_json("/saved", &bob).await;
    assert_eq!(saved, json!([]));

    let response = server.post("/posts/missing/like", &bob).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_comments_are_listed_and_notify_author() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let bob = server.create_user("bob").await;

    let post = server.create_post(&alice, "Hello", "body").await;
    let comments_path = format!("/posts/{}/comments", post["id"].as_str().unwrap());

    let response = server
        .post_json(&comments_path, &bob, json!({ "text": "nice post" }))
        .await;
    assert_eq!(response.status(), 201);
    let comment: Value = response.json().await.unwrap();
    assert_eq!(comment["body"], "nice post");
    assert_eq!(comment["username"], "bob");

    let response = server
        .post_json(&comments_path, &bob, json!({ "text": "   " }))
        .await;
    assert_eq!(response.status(), 400);

    let comments = server.get_json(&comments_path, &alice).await;
    assert_eq!(comments.as_array().unwrap().len(), 1);

    let feed = server.get_json("/", &alice).await;
    assert_eq!(feed[0]["comment_count"], 1);

    let notifications = server.get_json("/notifications", &alice).await;
    assert_eq!(notifications[0]["kind"], "comment");
    let notification_id = notifications[0]["id"].as_str().unwrap();

    // Marking read is idempotent
    for _ in 0..2 {
        let response = server
            .post(&format!("/notifications/{}/read", notification_id), &alice)
            .await;
        assert_eq!(response.status(), 204);
    }
    let notifications = server.get_json("/notifications", &alice).await;
    assert_eq!(notifications, json!([]));

    let response = server.post("/notifications/missing/read", &alice).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_home_feed_is_newest_first_and_annotated() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let bob = server.create_user("bob").await;

    let first = server.create_post(&alice, "First", "one").await;
    let second = server.create_post(&bob, "Second", "two").await;

    server
        .post(&format!("/posts/{}/like", first["id"].as_str().unwrap()), &bob)
        .await;

    let feed = server.get_json("/", &bob).await;
    let feed = feed.as_array().unwrap();
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0]["id"], second["id"]);
    assert_eq!(feed[1]["id"], first["id"]);
    assert_eq!(feed[1]["liked"], true);
    assert_eq!(feed[1]["like_count"], 1);

    // Keyset pagination
    let page = server
        .get_json(
            &format!("/?limit=1&max_id={}", second["id"].as_str().unwrap()),
            &bob,
        )
        .await;
    assert_eq!(page.as_array().unwrap().len(), 1);
    assert_eq!(page[0]["id"], first["id"]);
}

#[tokio::test]
async fn test_delete_post_requires_ownership() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let bob = server.create_user("bob").await;

    let post = server.create_post(&alice, "Hello", "body").await;
    let path = format!("/posts/{}", post["id"].as_str().unwrap());

    let response = server.delete(&path, &bob).await;
    assert_eq!(response.status(), 403);

    let response = server.delete(&path, &alice).await;
    assert_eq!(response.status(), 204);

    let feed = server.get_json("/", &alice).await;
    assert_eq!(feed, json!([]));

    let response = server.delete(&path, &alice).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_search_suggest_and_profile_listing() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    server.create_user("alicia").await;
    server.create_user("bob").await;

    let found = server.get_json("/search?username=bob", &alice).await;
    assert_eq!(found["username"], "bob");
    assert_eq!(found["followed_by_viewer"], false);

    let response = server.get("/search?username=BOB", &alice).await;
    assert_eq!(response.status(), 404);

    let suggestions = server.get_json("/suggest?username=ALI", &alice).await;
    let mut names: Vec<String> = serde_json::from_value(suggestions).unwrap();
    names.sort();
    assert_eq!(names, vec!["alice", "alicia"]);

    let suggestions = server.get_json("/suggest?username=%25", &alice).await;
    assert_eq!(suggestions, json!([]));

    let profiles = server.get_json("/profiles", &alice).await;
    let names: Vec<&str> = profiles
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["username"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(!names.contains(&"alice"));
}

#[tokio::test]
async fn test_profile_patch_and_avatar_upload() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;

    let response = server
        .client
        .patch(server.url("/profile"))
        .bearer_auth(&alice.token)
        .json(&json!({ "display_name": "Alice", "gender": "F", "bio": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let profile: Value = response.json().await.unwrap();
    assert_eq!(profile["display_name"], "Alice");
    assert_eq!(profile["gender"], "F");

    let response = server
        .client
        .patch(server.url("/profile"))
        .bearer_auth(&alice.token)
        .json(&json!({ "bio": null }))
        .send()
        .await
        .unwrap();
    let profile: Value = response.json().await.unwrap();
    assert!(profile["bio"].is_null());
    assert_eq!(profile["display_name"], "Alice");

    let response = server
        .client
        .patch(server.url("/profile"))
        .bearer_auth(&alice.token)
        .json(&json!({ "gender": "X" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let png: Vec<u8> = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3, 4];
    let part = reqwest::multipart::Part::bytes(png.clone())
        .file_name("avatar.png")
        .mime_str("image/png")
        .unwrap();
    let form = reqwest::multipart::Form::new().part("avatar", part);
    let response = server
        .client
        .put(server.url("/profile/avatar"))
        .bearer_auth(&alice.token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let avatar_url = body["avatar_url"].as_str().unwrap().to_string();
    assert!(avatar_url.starts_with(&server.url("/media/")));

    let served = server.client.get(&avatar_url).send().await.unwrap();
    assert_eq!(served.status(), 200);
    assert_eq!(served.bytes().await.unwrap().to_vec(), png);

    let response = server
        .client
        .delete(server.url("/profile/avatar"))
        .bearer_auth(&alice.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let profile = server.get_json("/profile", &alice).await;
    assert!(profile["avatar_url"].is_null());
    let served = server.client.get(&avatar_url).send().await.unwrap();
    assert_eq!(served.status(), 404);
}

#[tokio::test]
async fn test_phone_verification_flow() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice").await;
    let carol = server
        .create_user_with_phone("carol", Some("+14155550000"))
        .await;

    // No phone on file
    let response = server.post("/phone/otp", &alice).await;
    assert_eq!(response.status(), 400);

    let response = server.post("/phone/otp", &carol).await;
    assert_eq!(response.status(), 202);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["expires_in"], 300);

    let (mobiles, code) = server.sent_codes.lock().unwrap()[0].clone();
    assert_eq!(mobiles, "14155550000");
    assert_eq!(code.len(), 6);

    let wrong = if code == "123456" { "654321" } else { "123456" };
    let response = server
        .post_json("/phone/otp/verify", &carol, json!({ "code": wrong }))
        .await;
    assert_eq!(response.status(), 400);

    let response = server
        .post_json("/phone/otp/verify", &carol, json!({ "code": code }))
        .await;
    assert_eq!(response.status(), 204);

    let profile = server.get_json("/profile", &carol).await;
    assert_eq!(profile["phone_verified"], true);

    // Codes are single use
    let response = server
        .post_json("/phone/otp/verify", &carol, json!({ "code": code }))
        .await;
    assert_eq!(response.status(), 400);
}
