//! Operator commands for accounts, questions and choices. Needs `DATABASE_URL`.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Report, WrapErr};
use dotenv::dotenv;
use polls_server::{
    config::Config,
    db::{choice::ChoiceId, postgres::PgStore, question::QuestionId},
    log,
    services::{
        admin::{AdminService, QuestionEdit},
        audit::TracingAuditSink,
        auth::AuthService,
    },
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "polls_admin", about = "Manage polls and accounts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a login account
    AddUser { username: String, password: String },
    /// Create a question with its choices. Times are RFC 3339.
    AddQuestion {
        text: String,
        publish_at: DateTime<Utc>,
        close_at: DateTime<Utc>,
        #[arg(required = true)]
        choices: Vec<String>,
    },
    /// Change the text or schedule of a question
    EditQuestion {
        id: Uuid,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        publish_at: Option<DateTime<Utc>>,
        #[arg(long)]
        close_at: Option<DateTime<Utc>>,
    },
    /// Add one more choice to a question
    AddChoice { question_id: Uuid, text: String },
    /// Delete a question with its choices and votes
    DeleteQuestion { id: Uuid },
    /// Delete a choice, keeping the votes that pointed at it
    DeleteChoice { id: Uuid },
}

async fn open_store(config: &Config) -> Result<Arc<PgStore>, Report> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| eyre!("DATABASE_URL must be set"))?;
    let store = PgStore::connect(database_url, 1)
        .await
        .wrap_err("Unable to connect to database")?;
    store.migrate().await.wrap_err("Unable to migrate database")?;
    Ok(Arc::new(store))
}

#[actix_rt::main]
async fn main() -> Result<(), Report> {
    dotenv().ok();
    log::init()?;
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let store = open_store(&config).await?;
    let admin = AdminService::new(store.clone());

    match cli.command {
        Command::AddUser { username, password } => {
            let auth = AuthService::new(store, Arc::new(TracingAuditSink));
            let user = auth
                .register(&username, &password)
                .await
                .wrap_err_with(|| format!("Unable to create user {}", username))?;
            info!(user_id = user.id.as_string().as_str(), "Created user {}", user.username);
        }
        Command::AddQuestion {
            text,
            publish_at,
            close_at,
            choices,
        } => {
            let (question, choices) = admin
                .create_poll(&text, publish_at, close_at, &choices)
                .await
                .wrap_err("Unable to create question")?;
            info!(
                id = %question.id,
                choices = choices.len(),
                "Created question {:?}",
                question.text
            );
        }
        Command::EditQuestion {
            id,
            text,
            publish_at,
            close_at,
        } => {
            let edit = QuestionEdit {
                text,
                publish_at,
                close_at,
            };
            let question = admin
                .edit_question(QuestionId(id), edit)
                .await
                .wrap_err_with(|| format!("Unable to edit question {}", id))?;
            info!(id = %question.id, "Updated question {:?}", question.text);
        }
        Command::AddChoice { question_id, text } => {
            let choice = admin
                .add_choice(QuestionId(question_id), &text)
                .await
                .wrap_err_with(|| format!("Unable to add choice to question {}", question_id))?;
            info!(id = %choice.id, "Added choice {:?}", choice.text);
        }
        Command::DeleteQuestion { id } => {
            if !admin.delete_question(QuestionId(id)).await? {
                return Err(eyre!("Question {} does not exist", id));
            }
            info!(%id, "Deleted question");
        }
        Command::DeleteChoice { id } => {
            if !admin.delete_choice(ChoiceId(id)).await? {
                return Err(eyre!("Choice {} does not exist", id));
            }
            info!(%id, "Deleted choice");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_add_question() {
        let cli = Cli::try_parse_from([
            "polls_admin",
            "add-question",
            "What's up?",
            "2026-01-01T00:00:00Z",
            "2026-02-01T00:00:00+01:00",
            "Not much",
            "The sky",
        ])
        .unwrap();
        match cli.command {
            Command::AddQuestion {
                text,
                publish_at,
                close_at,
                choices,
            } => {
                assert_eq!(text, "What's up?");
                assert_eq!(publish_at.to_rfc3339(), "2026-01-01T00:00:00+00:00");
                assert_eq!(close_at.to_rfc3339(), "2026-01-31T23:00:00+00:00");
                assert_eq!(choices, ["Not much", "The sky"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn add_question_needs_a_choice_and_valid_times() {
        assert!(Cli::try_parse_from([
            "polls_admin",
            "add-question",
            "Q",
            "2026-01-01T00:00:00Z",
            "2026-02-01T00:00:00Z",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "polls_admin",
            "add-question",
            "Q",
            "tomorrow",
            "2026-02-01T00:00:00Z",
            "Yes",
        ])
        .is_err());
    }

    #[test]
    fn parses_edit_question_flags() {
        let id = Uuid::new_v4();
        let id_arg = id.to_string();
        let cli = Cli::try_parse_from([
            "polls_admin",
            "edit-question",
            id_arg.as_str(),
            "--close-at",
            "2026-03-01T12:00:00Z",
        ])
        .unwrap();
        match cli.command {
            Command::EditQuestion {
                id: parsed,
                text,
                publish_at,
                close_at,
            } => {
                assert_eq!(parsed, id);
                assert_eq!(text, None);
                assert_eq!(publish_at, None);
                let close_at = close_at.map(|t| t.to_rfc3339());
                assert_eq!(close_at.as_deref(), Some("2026-03-01T12:00:00+00:00"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
