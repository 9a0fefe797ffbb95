//! Operator dashboard
//!
//! Server-rendered HTML summary of users, linked accounts and cached
//! transactions.

use std::fmt::Write;

use axum::{extract::State, http::StatusCode, response::Html};
use chrono::Utc;

use crate::store::{DashboardStats, StoreResult, User};

use super::AppState;

/// Number of most recent users listed on the dashboard
pub const RECENT_USERS: usize = 10;

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;color:#1f2933}\
.stats{display:flex;gap:1rem;margin-bottom:2rem}\
.stat{border:1px solid #d9e2ec;border-radius:8px;padding:1rem 1.5rem}\
.stat .value{display:block;font-size:2rem;font-weight:600}\
table{border-collapse:collapse;width:100%}\
th,td{text-align:left;padding:.5rem;border-bottom:1px solid #d9e2ec}\
.error{border:1px solid #e12d39;background:#ffe3e3;padding:1rem;border-radius:8px}";

pub async fn dashboard(State(state): State<AppState>) -> (StatusCode, Html<String>) {
    match load(&state).await {
        Ok((stats, users)) => (StatusCode::OK, Html(render_dashboard(&stats, &users))),
        Err(e) => {
            tracing::error!("Dashboard error: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Html(render_error()))
        }
    }
}

async fn load(state: &AppState) -> StoreResult<(DashboardStats, Vec<User>)> {
    let stats = state.store.dashboard_stats(Utc::now()).await?;
    let mut users = state.store.list_users().await?;
    users.truncate(RECENT_USERS);

    Ok((stats, users))
}

/// Full dashboard page; `users` is expected newest first
pub fn render_dashboard(stats: &DashboardStats, users: &[User]) -> String {
    let mut body = String::new();

    body.push_str("<h1>CashAI Dashboard</h1>\n<section class=\"stats\">\n");
    for (key, label, value) in [
        ("totalUsers", "Total users", stats.total_users),
        (
            "totalLinkedAccounts",
            "Linked accounts",
            stats.total_linked_accounts,
        ),
        ("totalTransactions", "Transactions", stats.total_transactions),
        ("activeUsers", "Active users (7 days)", stats.active_users),
    ] {
        let _ = writeln!(
            body,
            "<div class=\"stat\" data-stat=\"{}\"><span class=\"value\">{}</span>{}</div>",
            key, value, label
        );
    }
    body.push_str("</section>\n<h2>Recent users</h2>\n");

    if users.is_empty() {
        body.push_str("<p>No users yet.</p>\n");
    } else {
        body.push_str(
            "<table>\n<thead><tr><th>ID</th><th>Email</th><th>Name</th>\
             <th>Login method</th><th>Created</th></tr></thead>\n<tbody>\n",
        );
        for user in users.iter().take(RECENT_USERS) {
            let _ = writeln!(
                body,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                user.id,
                escape_html(&user.email),
                escape_html(&user.name),
                user.login_method,
                user.created_at.format("%Y-%m-%d %H:%M UTC"),
            );
        }
        body.push_str("</tbody>\n</table>\n");
    }

    page("CashAI Dashboard", &body)
}

pub fn render_error() -> String {
    page(
        "CashAI Dashboard",
        "<div class=\"error\"><h1>Dashboard error</h1>\
         <p>The dashboard could not be loaded.</p></div>\n",
    )
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{}</title>\n<style>{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(title),
        STYLE,
        body
    )
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
