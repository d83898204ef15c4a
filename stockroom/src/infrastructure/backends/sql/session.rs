// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Per-Session Identity (RLS)
//!
//! Before any SQL operation the backend sets three transaction-local
//! variables on the connection that will run the queries:
//!
//! - `app.current_tenant_id`
//! - `app.current_user_id`
//! - `app.current_role` (`user` or `background_worker`)
//!
//! The row-level security policies in the migrations enforce
//! `tenant_id = current_setting('app.current_tenant_id', true)` and
//! `user_id = current_setting('app.current_user_id', true)` on every
//! tenant-scoped table, with a bypass when `app.current_role` is
//! `background_worker`. A missing or empty identity variable can never
//! satisfy the equality, so unscoped sessions read zero rows.
//!
//! `set_config(..., true)` scopes the values to the enclosing transaction,
//! which guarantees they live on the same pooled connection as the queries
//! that follow.

use sqlx::{PgPool, Postgres, Transaction};

use stockroom_domain::{DomainResult, RequestIdentity};

use super::helpers::map_sql_err;

/// Role value the RLS worker policy recognises.
pub const BACKGROUND_WORKER_ROLE: &str = "background_worker";

/// Begins a transaction with the caller identity applied to the session.
pub async fn begin_scoped(
    pool: &PgPool,
    scope: &RequestIdentity,
) -> DomainResult<Transaction<'static, Postgres>> {
    let mut tx = pool.begin().await.map_err(|e| map_sql_err(e, "transaction"))?;

    let (tenant, user, role) = match scope.require_user() {
        Ok((tenant, user)) => (tenant.as_str().to_string(), user.as_str().to_string(), "user"),
        Err(_) => (String::new(), String::new(), BACKGROUND_WORKER_ROLE),
    };

    sqlx::query(
        "SELECT set_config('app.current_tenant_id', $1, true), \
                set_config('app.current_user_id', $2, true), \
                set_config('app.current_role', $3, true)",
    )
    .bind(&tenant)
    .bind(&user)
    .bind(role)
    .execute(&mut *tx)
    .await
    .map_err(|e| map_sql_err(e, "session"))?;

    Ok(tx)
}
