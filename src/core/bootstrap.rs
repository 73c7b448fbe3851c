use uuid::Uuid;

use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::UserRole;
use crate::repositories;

pub(crate) async fn ensure_superuser(state: &AppState) -> anyhow::Result<()> {
    let admin = state.settings().admin();
    if admin.first_superuser_password.is_empty() {
        tracing::warn!("FIRST_SUPERUSER_PASSWORD not configured; skipping superuser creation");
        return Ok(());
    }

    let username = &admin.first_superuser_username;
    let now = primitive_now_utc();

    if let Some(user) = repositories::users::find_by_username(state.db(), username).await? {
        let password_matches =
            security::verify_password(&admin.first_superuser_password, &user.hashed_password)
                .unwrap_or(false);

        let hashed_password = if password_matches {
            None
        } else {
            Some(security::hash_password(&admin.first_superuser_password)?)
        };
        let role = (user.role != UserRole::Admin).then_some(UserRole::Admin);
        let is_active = (!user.is_active).then_some(true);

        if hashed_password.is_none() && role.is_none() && is_active.is_none() {
            tracing::info!("Default superuser already up to date");
            return Ok(());
        }

        repositories::users::update(
            state.db(),
            &user.id,
            repositories::users::UpdateUser { role, is_active, hashed_password, updated_at: now },
        )
        .await?;

        tracing::info!(username = %username, "Updated default superuser");
        return Ok(());
    }

    let hashed_password = security::hash_password(&admin.first_superuser_password)?;
    repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            username,
            hashed_password,
            full_name: "Super Admin",
            role: UserRole::Admin,
            is_active: true,
            created_at: now,
        },
    )
    .await?;

    tracing::info!(username = %username, "Created default superuser");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    #[ignore = "requires postgres and redis"]
    async fn ensure_superuser_creates_then_repairs_admin() {
        let ctx = test_support::setup_test_context().await;
        let username = ctx.state.settings().admin().first_superuser_username.clone();

        ensure_superuser(&ctx.state).await.expect("create superuser");
        let created = repositories::users::find_by_username(ctx.state.db(), &username)
            .await
            .expect("query")
            .expect("superuser");
        assert_eq!(created.role, UserRole::Admin);

        repositories::users::update(
            ctx.state.db(),
            &created.id,
            repositories::users::UpdateUser {
                role: Some(UserRole::Student),
                is_active: Some(false),
                hashed_password: None,
                updated_at: primitive_now_utc(),
            },
        )
        .await
        .expect("demote");

        ensure_superuser(&ctx.state).await.expect("repair superuser");
        let repaired = repositories::users::find_by_username(ctx.state.db(), &username)
            .await
            .expect("query")
            .expect("superuser");
        assert_eq!(repaired.role, UserRole::Admin);
        assert!(repaired.is_active);
    }
}
