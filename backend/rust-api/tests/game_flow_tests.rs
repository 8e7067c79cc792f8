use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;

use sqlquest_api::services::session_store::InMemorySessionStore;

mod common;

use common::{answer_query, establish, send, submit};

#[tokio::test]
async fn test_establish_team_starts_fresh_session() {
    let app = common::create_test_app();
    let session = establish(&app, "night-owls").await;

    assert_eq!(session["team_id"], "night-owls");
    assert_eq!(session["question_set"]["id"], "set1");
    assert_eq!(session["selected_question"], 1);
    assert_eq!(session["finished"], false);
    assert_eq!(session["completed"], false);

    let questions = session["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 5);
    for question in questions {
        assert_eq!(question["phase"], "new");
        assert_eq!(question["verdict"], "unattempted");
        assert_eq!(question["attempts"], 0);
        assert_eq!(question["remaining_attempts"], 5);
        assert_eq!(question["attempts_message"], "5 attempts remaining");
        assert!(question.get("hint").is_none());
    }
}

#[tokio::test]
async fn test_establish_team_validates_name() {
    let app = common::create_test_app();

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/teams",
        Some(json!({ "team_id": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "POST", "/api/v1/teams", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn test_unknown_team_must_establish_first() {
    let app = common::create_test_app();

    let (status, body) = send(&app, "GET", "/api/v1/teams/strangers/session", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains("Team not established"));

    let (status, _) = submit(&app, "strangers", 1, "SELECT 1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_correct_answer_solves_without_consuming_attempt() {
    let app = common::create_test_app();
    establish(&app, "night-owls").await;

    let (status, body) = submit(&app, "night-owls", 1, &answer_query("Coconut")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verdict"], "correct");
    assert_eq!(body["attempts"], 0);
    assert_eq!(body["locked"], false);
    assert_eq!(body["diagnostic"], "Validation passed");
    assert_eq!(body["result"]["rows"][0]["item_name"], "Coconut");

    let (_, session) = send(&app, "GET", "/api/v1/teams/night-owls/session", None).await;
    assert_eq!(session["questions"][0]["phase"], "solved");
    assert_eq!(session["stats"]["correct_answers"], 1);

    // Solved questions are frozen.
    let (status, _) = submit(&app, "night-owls", 1, &answer_query("Rosary")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (_, session) = send(&app, "GET", "/api/v1/teams/night-owls/session", None).await;
    assert_eq!(session["questions"][0]["verdict"], "correct");
    assert_eq!(session["questions"][0]["attempts"], 0);
    assert_eq!(
        session["questions"][0]["last_query"],
        answer_query("Coconut")
    );
}

#[tokio::test]
async fn test_wrong_answer_reports_diagnostic() {
    let app = common::create_test_app();
    establish(&app, "night-owls").await;

    let (status, body) = submit(&app, "night-owls", 1, &answer_query("Rosary")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verdict"], "incorrect");
    assert_eq!(body["attempts"], 1);
    assert_eq!(body["remaining_attempts"], 4);
    assert_eq!(
        body["diagnostic"],
        "Column 'item_name': expected 'Coconut', got 'Rosary'"
    );

    let (_, body) = submit(
        &app,
        "night-owls",
        1,
        "SELECT item_name FROM exorcism_items WHERE item_name = 'Lemon'",
    )
    .await;
    assert_eq!(body["diagnostic"], "Expected 1 row(s), got 2 row(s)");
    assert_eq!(body["attempts"], 2);
}

#[tokio::test]
async fn test_question_locks_on_fifth_failure() {
    let app = common::create_test_app();
    establish(&app, "night-owls").await;

    for attempt in 1..=4 {
        let (status, body) = submit(&app, "night-owls", 2, &answer_query("Coconut")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["attempts"], attempt);
        assert_eq!(body["locked"], false);
    }

    let (_, session) = send(&app, "GET", "/api/v1/teams/night-owls/session", None).await;
    assert_eq!(session["questions"][1]["phase"], "investigating");
    assert_eq!(session["questions"][1]["attempts_message"], "1 attempt remaining");

    let (_, body) = submit(&app, "night-owls", 2, &answer_query("Coconut")).await;
    assert_eq!(body["attempts"], 5);
    assert_eq!(body["remaining_attempts"], 0);
    assert_eq!(body["locked"], true);

    // Even the right answer is refused now, and nothing is consumed.
    let (status, _) = submit(&app, "night-owls", 2, &answer_query("Rosary")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, session) = send(&app, "GET", "/api/v1/teams/night-owls/session", None).await;
    let question = &session["questions"][1];
    assert_eq!(question["phase"], "locked");
    assert_eq!(question["attempts"], 5);
    assert_eq!(question["attempts_message"], "No attempts remaining");
    assert_eq!(session["stats"]["blocked_questions"], 1);
}

#[tokio::test]
async fn test_write_statement_is_an_error_attempt() {
    let app = common::create_test_app();
    establish(&app, "night-owls").await;

    let (status, body) = submit(&app, "night-owls", 1, "DELETE FROM exorcism_items").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verdict"], "error");
    assert_eq!(body["attempts"], 1);
    assert_eq!(body["diagnostic"], "Only SELECT queries are allowed");
    assert_eq!(body["result"]["error"], "Only SELECT queries are allowed");

    let (_, body) = send(
        &app,
        "POST",
        "/api/execute-query",
        Some(json!({ "query": "SELECT COUNT(*) AS total FROM exorcism_items" })),
    )
    .await;
    assert_eq!(body["data"][0]["total"], 42);
}

#[tokio::test]
async fn test_syntax_error_is_an_error_attempt() {
    let app = common::create_test_app();
    establish(&app, "night-owls").await;

    let (_, body) = submit(&app, "night-owls", 3, "SELECT * FROM no_such_table").await;
    assert_eq!(body["verdict"], "error");
    assert_eq!(body["attempts"], 1);
    assert!(body["diagnostic"]
        .as_str()
        .unwrap()
        .contains("no such table"));
}

#[tokio::test]
async fn test_blank_submission_is_a_no_op() {
    let app = common::create_test_app();
    establish(&app, "night-owls").await;

    let (status, _) = submit(&app, "night-owls", 1, "   ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, session) = send(&app, "GET", "/api/v1/teams/night-owls/session", None).await;
    assert_eq!(session["questions"][0]["attempts"], 0);
    assert_eq!(session["questions"][0]["phase"], "new");
    assert!(session["questions"][0]["last_query"].is_null());
}

#[tokio::test]
async fn test_unknown_question_is_not_found() {
    let app = common::create_test_app();
    establish(&app, "night-owls").await;

    let (status, _) = submit(&app, "night-owls", 99, "SELECT 1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/teams/night-owls/questions/99/select",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_select_question_changes_focus_only() {
    let app = common::create_test_app();
    establish(&app, "night-owls").await;

    let (status, session) = send(
        &app,
        "POST",
        "/api/v1/teams/night-owls/questions/4/select",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["selected_question"], 4);
    assert_eq!(session["questions"][3]["phase"], "new");
}

#[tokio::test]
async fn test_hint_toggle_reveals_and_hides_hint() {
    let app = common::create_test_app();
    establish(&app, "night-owls").await;

    let (status, session) =
        send(&app, "POST", "/api/v1/teams/night-owls/questions/1/hint", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["questions"][0]["hint_shown"], true);
    assert!(session["questions"][0]["hint"].is_string());
    assert_eq!(session["questions"][0]["attempts"], 0);

    let (_, session) =
        send(&app, "POST", "/api/v1/teams/night-owls/questions/1/hint", None).await;
    assert_eq!(session["questions"][0]["hint_shown"], false);
    assert!(session["questions"][0].get("hint").is_none());
}

#[tokio::test]
async fn test_finish_returns_summary_and_is_idempotent() {
    let app = common::create_test_app();
    establish(&app, "night-owls").await;

    submit(&app, "night-owls", 1, &answer_query("Coconut")).await;
    submit(&app, "night-owls", 2, &answer_query("Coconut")).await;
    submit(&app, "night-owls", 2, &answer_query("Rosary")).await;
    send(&app, "POST", "/api/v1/teams/night-owls/questions/3/hint", None).await;

    let (status, summary) = send(&app, "POST", "/api/v1/teams/night-owls/finish", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["teamName"], "night-owls");
    assert_eq!(summary["totalQuestions"], 5);
    assert_eq!(summary["score"], 2);
    assert_eq!(summary["totalAttempts"], 1);
    assert_eq!(summary["successRate"], 40.0);
    assert_eq!(summary["efficiency"], 100.0);
    assert_eq!(summary["questions"][0]["status"], "correct");
    assert_eq!(summary["questions"][2]["status"], "wrong");
    assert_eq!(summary["questions"][2]["showHint"], true);
    assert_eq!(
        summary["questions"][0]["expectedOutput"],
        json!([{ "item_name": "Coconut" }])
    );

    let (status, again) = send(&app, "POST", "/api/v1/teams/night-owls/finish", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again, summary);

    let (_, session) = send(&app, "GET", "/api/v1/teams/night-owls/session", None).await;
    assert_eq!(session["finished"], true);

    let (status, pure) = send(&app, "GET", "/api/v1/teams/night-owls/summary", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pure["score"], 2);
}

#[tokio::test]
async fn test_stalled_when_everything_is_solved_or_locked() {
    let app = common::create_test_app();
    establish(&app, "night-owls").await;

    let answers = ["Coconut", "Rosary", "Neem Leaf", "Holy Water"];
    for (index, item) in answers.iter().enumerate() {
        submit(&app, "night-owls", index as u32 + 1, &answer_query(item)).await;
    }
    for _ in 0..5 {
        submit(&app, "night-owls", 5, &answer_query("Coconut")).await;
    }

    let (_, session) = send(&app, "GET", "/api/v1/teams/night-owls/session", None).await;
    assert_eq!(session["completed"], false);
    assert_eq!(session["stalled"], true);
    assert_eq!(session["stats"]["correct_answers"], 4);
    assert_eq!(session["stats"]["blocked_questions"], 1);
}

#[tokio::test]
async fn test_reset_draws_new_set_and_clears_progress() {
    let app = common::create_test_app_with(Arc::new(InMemorySessionStore::new()), vec![0, 1]);
    establish(&app, "night-owls").await;
    submit(&app, "night-owls", 1, &answer_query("Rosary")).await;

    let (status, session) = send(&app, "POST", "/api/v1/teams/night-owls/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["question_set"]["id"], "set2");
    assert_eq!(session["questions"][0]["attempts"], 0);
    assert_eq!(session["finished"], false);

    let (_, body) = submit(
        &app,
        "night-owls",
        1,
        "SELECT DISTINCT item_name FROM exorcism_items WHERE item_name = 'Lemon'",
    )
    .await;
    assert_eq!(body["verdict"], "correct");
}

#[tokio::test]
async fn test_logout_forgets_team() {
    let app = common::create_test_app();
    establish(&app, "night-owls").await;

    let (status, _) = send(&app, "POST", "/api/v1/teams/night-owls/logout", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", "/api/v1/teams/night-owls/session", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_question_sets_are_listed() {
    let app = common::create_test_app();

    let (status, body) = send(&app, "GET", "/api/question-sets", None).await;
    assert_eq!(status, StatusCode::OK);
    let sets = body.as_array().unwrap();
    assert_eq!(sets.len(), 7);
    assert_eq!(sets[0]["id"], "set1");
    assert_eq!(sets[0]["question_count"], 5);
}
