use crate::db::{choice::ChoiceId, question::QuestionId, session::SessionId, user::User, PollStore};
use crate::error::PollError;
use crate::notice::{self, Notice, NOTICE_COOKIE};
use crate::pages::{DetailPage, IndexPage, LoginPage, QuestionSummary, ResultsPage};
use crate::services::{
    audit::{client_ip, AuditSink},
    auth::AuthService,
    polls::PollService,
};
use actix_web::{
    cookie::{Cookie, SameSite},
    dev::Payload,
    http::{header, StatusCode},
    web, FromRequest, HttpRequest, HttpResponse,
};
use chrono::Utc;
use futures::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use std::sync::Arc;
use tracing::{debug, instrument};

pub const SESSION_COOKIE: &str = "polls_session";
pub const INDEX_PATH: &str = "/polls/";

pub struct AppState {
    pub polls: PollService,
    pub auth: AuthService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PollStore>,
        audit: Arc<dyn AuditSink>,
        enforce_voting_window: bool,
    ) -> Self {
        Self {
            polls: PollService::new(store.clone(), enforce_voting_window),
            auth: AuthService::new(store, audit),
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/polls")
            .route("/", web::get().to(index))
            .route("/{question_id}/", web::get().to(detail))
            .route("/{question_id}/results/", web::get().to(results))
            .route("/{question_id}/vote/", web::post().to(vote)),
    )
    .service(
        web::scope("/accounts")
            .route("/login/", web::post().to(login))
            .route("/logout/", web::post().to(logout)),
    );
}

pub fn results_path(id: QuestionId) -> String {
    format!("/polls/{}/results/", id)
}

/// Logged-in user resolved from the session cookie.
pub struct Identity {
    pub session_id: SessionId,
    pub user: User,
}

pub struct CurrentUser(pub Option<Identity>);

impl CurrentUser {
    fn user(&self) -> Option<&User> {
        self.0.as_ref().map(|identity| &identity.user)
    }
}

impl FromRequest for CurrentUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let session_id = session_id(req);
        async move {
            let (state, session_id) = match (state, session_id) {
                (Some(state), Some(session_id)) => (state, session_id),
                _ => return Ok(CurrentUser(None)),
            };
            let user = state.auth.current_user(session_id).await?;
            Ok(CurrentUser(
                user.map(|user| Identity { session_id, user }),
            ))
        }
        .boxed_local()
    }
}

fn session_id(req: &HttpRequest) -> Option<SessionId> {
    req.cookie(SESSION_COOKIE)
        .and_then(|cookie| cookie.value().parse().ok())
}

fn session_cookie(id: SessionId) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, id.as_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish()
}

fn flash_notices(req: &HttpRequest) -> Vec<Notice> {
    notice::take_flash(req).into_iter().collect()
}

fn render<T: Serialize>(req: &HttpRequest, status: StatusCode, page: &T) -> HttpResponse {
    let mut response = HttpResponse::build(status);
    if req.cookie(NOTICE_COOKIE).is_some() {
        response.cookie(notice::removal_cookie());
    }
    response.json(page)
}

fn redirect(location: &str, notice: Option<Notice>) -> HttpResponse {
    let mut response = HttpResponse::SeeOther();
    response.insert_header((header::LOCATION, location));
    if let Some(notice) = notice {
        response.cookie(notice::flash_cookie(notice));
    }
    response.finish()
}

#[instrument(skip_all)]
async fn index(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, PollError> {
    let now = Utc::now();
    let questions = state.polls.visible_questions(now).await?;
    let page = IndexPage {
        questions: questions
            .iter()
            .map(|question| QuestionSummary::new(question, now))
            .collect(),
        notices: flash_notices(&req),
    };
    Ok(render(&req, StatusCode::OK, &page))
}

#[instrument(skip_all, fields(question_id = %path))]
async fn detail(
    req: HttpRequest,
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, PollError> {
    let now = Utc::now();
    let id = QuestionId(path.into_inner());
    match state.polls.detail(id, user.user(), now).await {
        Ok(detail) => {
            let mut notices = flash_notices(&req);
            notices.extend(detail.notices.iter().copied());
            Ok(render(&req, StatusCode::OK, &DetailPage::new(&detail, notices, now)))
        }
        Err(PollError::Unauthenticated) => {
            debug!("Anonymous detail request");
            Ok(redirect(INDEX_PATH, Some(Notice::LoginRequired)))
        }
        Err(err) => Err(err),
    }
}

#[instrument(skip_all, fields(question_id = %path))]
async fn results(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, PollError> {
    let now = Utc::now();
    let detail = state
        .polls
        .results(QuestionId(path.into_inner()), now)
        .await?;
    let page = ResultsPage::new(&detail, flash_notices(&req), now);
    Ok(render(&req, StatusCode::OK, &page))
}

#[derive(Debug, Deserialize)]
pub struct VoteForm {
    choice: Option<String>,
}

#[instrument(skip_all, fields(question_id = %path))]
async fn vote(
    req: HttpRequest,
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<Uuid>,
    form: Option<web::Form<VoteForm>>,
) -> Result<HttpResponse, PollError> {
    let now = Utc::now();
    let id = QuestionId(path.into_inner());
    // An empty or non-form body is treated as a ballot without a choice.
    let choice = form
        .and_then(|form| form.into_inner().choice)
        .and_then(|choice| Uuid::parse_str(choice.trim()).ok())
        .map(ChoiceId);

    match state.polls.cast_vote(id, choice, user.user(), now).await {
        Ok(receipt) => Ok(redirect(&results_path(id), Some(receipt.notice))),
        Err(PollError::Unauthenticated) => Ok(redirect(INDEX_PATH, Some(Notice::LoginRequired))),
        Err(err @ (PollError::InvalidChoice | PollError::VotingClosed)) => {
            debug!(error = %err, "Ballot rejected, showing question again");
            let detail = state.polls.detail(id, user.user(), now).await?;
            let mut notices = detail.notices.clone();
            if let Some(notice) = err.notice() {
                if !notices.contains(&notice) {
                    notices.push(notice);
                }
            }
            Ok(render(&req, StatusCode::OK, &DetailPage::new(&detail, notices, now)))
        }
        Err(err) => Err(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[instrument(skip_all, fields(username = %form.username))]
async fn login(
    req: HttpRequest,
    state: web::Data<AppState>,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse, PollError> {
    let login = state
        .auth
        .login(&form.username, &form.password, client_ip(&req))
        .await;
    match login {
        Ok((session, _user)) => Ok(HttpResponse::SeeOther()
            .insert_header((header::LOCATION, INDEX_PATH))
            .cookie(session_cookie(session.id))
            .finish()),
        Err(PollError::InvalidCredentials) => {
            let page = LoginPage {
                notices: vec![Notice::LoginFailed],
            };
            Ok(render(&req, StatusCode::UNAUTHORIZED, &page))
        }
        Err(err) => Err(err),
    }
}

#[instrument(skip_all)]
async fn logout(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, PollError> {
    state.auth.logout(session_id(&req), client_ip(&req)).await?;
    let mut expired = session_cookie(SessionId::new());
    expired.make_removal();
    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, INDEX_PATH))
        .cookie(expired)
        .cookie(notice::flash_cookie(Notice::LoggedOut))
        .finish())
}
