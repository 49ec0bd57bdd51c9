/// Router Module Index
///
/// Routes are split by the guard they sit behind. The layers themselves are
/// applied in `create_router`, so a route cannot end up in a group without
/// its guard.

/// Routes reachable without a token: health check and login.
pub mod public;

/// Routes behind the `auth_middleware` (valid bearer token required).
pub mod authenticated;

/// Review routes behind `auth_middleware` and `privileged_middleware`.
pub mod admin;
