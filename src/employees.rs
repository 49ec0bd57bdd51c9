use crate::{
    auth::Identity,
    error::{AppError, AppResult},
    models::{Employee, UpdateProfileRequest},
    repository::Repository,
};

pub async fn get_profile(repo: &dyn Repository, caller: &Identity) -> AppResult<Employee> {
    repo.get_employee(caller.id)
        .await?
        .ok_or_else(|| AppError::not_found("employee not found"))
}

/// update_profile
///
/// Self-service update. Whatever `id` the body carries is replaced with the
/// caller's own.
pub async fn update_profile(
    repo: &dyn Repository,
    caller: &Identity,
    mut request: UpdateProfileRequest,
) -> AppResult<Employee> {
    request.id = Some(caller.id);
    request.name = request.name.trim().to_string();
    if request.name.is_empty() {
        return Err(AppError::invalid_input("name is required"));
    }

    let employee = repo
        .update_employee_profile(caller.id, &request)
        .await?
        .ok_or_else(|| AppError::not_found("employee not found"))?;

    tracing::info!(employee_id = caller.id, "profile updated");
    Ok(employee)
}
