use axum::{
    extract::{FromRef, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use tracing::{error, instrument};

use crate::{
    auth::{
        dto::{AuthForm, MeResponse},
        extractors::{MaybeUser, SessionUser},
        page::{landing_page, Notice},
        repo_types::User,
        services::{self, AuthError},
        session::{expired_cookie, SessionKeys},
    },
    conversions::{dto::HistoryEntry, repo_types::Conversion},
    state::AppState,
};

/// History rows returned by `/me`.
const RECENT_CONVERSIONS: i64 = 50;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/auth", post(authenticate))
        .route("/logout", get(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

pub async fn home(MaybeUser(user): MaybeUser) -> Html<String> {
    Html(landing_page(user.as_ref().map(|u| u.username.as_str()), None))
}

#[instrument(skip(state, form), fields(username = %form.username, kind = %form.kind))]
pub async fn authenticate(State(state): State<AppState>, Form(form): Form<AuthForm>) -> Response {
    let result = if form.is_signup() {
        services::register(&state.db, &form.username, &form.email, &form.password).await
    } else {
        services::login(&state.db, &form.username, &form.password).await
    };

    let user = match result {
        Ok(user) => user,
        Err(e) => return auth_failure(e),
    };

    let keys = SessionKeys::from_ref(&state);
    match keys.sign(user.id, &user.username) {
        Ok(token) => (
            [(header::SET_COOKIE, keys.cookie(&token))],
            Redirect::to("/"),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "session sign failed");
            auth_failure(AuthError::Internal(e))
        }
    }
}

fn auth_failure(e: AuthError) -> Response {
    let status = e.status();
    if let AuthError::Internal(inner) = &e {
        error!(error = %inner, "authentication failed");
        return (status, "Internal error".to_string()).into_response();
    }
    let msg = e.to_string();
    let notice = if e.is_signup_error() {
        Notice::Signup(&msg)
    } else {
        Notice::Login(&msg)
    };
    (status, Html(landing_page(None, Some(notice)))).into_response()
}

pub async fn logout() -> impl IntoResponse {
    ([(header::SET_COOKIE, expired_cookie())], Redirect::to("/"))
}

#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn get_me(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<MeResponse>, (StatusCode, String)> {
    let record = User::find_by_id(&state.db, user.id)
        .await
        .map_err(|e| {
            error!(error = %e, "load user failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    let conversions = Conversion::recent_for_user(&state.db, user.id, RECENT_CONVERSIONS)
        .await
        .map_err(|e| {
            error!(error = %e, "load history failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    Ok(Json(MeResponse {
        id: record.id,
        username: record.username,
        email: record.email,
        created_at: record.created_at.assume_utc(),
        conversions: conversions.into_iter().map(HistoryEntry::from).collect(),
    }))
}

#[cfg(test)]
mod auth_http_tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::app::build_app;

    fn form_request(body: &str) -> Request<Body> {
        Request::post("/auth")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn session_cookie(res: &Response) -> String {
        let set = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        set.split(';').next().unwrap().to_string()
    }

    async fn body_text(res: Response) -> String {
        String::from_utf8(to_bytes(res.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn signup_sets_session_and_landing_page_greets_user() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(AppState::fake(&dir).await);

        let res = app
            .clone()
            .oneshot(form_request("username=ada&password=pw&email=a%40b.c&type=signup"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/");
        let cookie = session_cookie(&res);
        assert!(cookie.starts_with("session="));

        let res = app
            .oneshot(Request::get("/").header(header::COOKIE, cookie).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(body_text(res).await.contains("Signed in as <strong>ada</strong>"));
    }

    #[tokio::test]
    async fn duplicate_signup_renders_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::fake(&dir).await;
        let app = build_app(state.clone());

        let body = "username=ada&password=pw&type=signup";
        app.clone().oneshot(form_request(body)).await.unwrap();
        let res = app.oneshot(form_request(body)).await.unwrap();

        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert!(res.headers().get(header::SET_COOKIE).is_none());
        assert!(body_text(res).await.contains("Username already exists!"));
    }

    #[tokio::test]
    async fn bad_login_renders_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(AppState::fake(&dir).await);
        app.clone()
            .oneshot(form_request("username=ada&password=pw&type=signup"))
            .await
            .unwrap();

        let res = app
            .clone()
            .oneshot(form_request("username=ada&password=wrong&type=login"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(res).await.contains("Invalid username or password"));

        let res = app
            .oneshot(form_request("username=ada&password=pw&type=login"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn logout_expires_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(AppState::fake(&dir).await);
        let res = app
            .oneshot(Request::get("/logout").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        let set = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn me_requires_session_and_lists_history() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::fake(&dir).await;
        let app = build_app(state.clone());

        let res = app
            .clone()
            .oneshot(Request::get("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .clone()
            .oneshot(form_request("username=ada&password=pw&type=signup"))
            .await
            .unwrap();
        let cookie = session_cookie(&res);
        let user = User::find_by_username(&state.db, "ada").await.unwrap().unwrap();
        Conversion::record(&state.db, user.id, "merge", "a.pdf", "merged_x.pdf")
            .await
            .unwrap();

        let res = app
            .oneshot(Request::get("/me").header(header::COOKIE, cookie).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(res).await).unwrap();
        assert_eq!(json["username"], "ada");
        assert_eq!(json["conversions"][0]["tool"], "merge");
        assert_eq!(json["conversions"][0]["download_url"], "/download/merged_x.pdf");
    }

    #[tokio::test]
    async fn forged_cookie_is_anonymous() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(AppState::fake(&dir).await);
        let res = app
            .oneshot(
                Request::get("/")
                    .header(header::COOKIE, "session=not.a.jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(res).await.contains("Log in</h2>"));
    }
}
