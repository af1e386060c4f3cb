//! Stable exit codes for the exec-staged CLI.

/// Run succeeded, or `recover` finished (including when nothing needed
/// recovering).
pub const OK: i32 = 0;
/// Any failure: check, prepare, task, merge, revert, interrupt or recovery.
pub const FAILURE: i32 = 1;

/// Exit code for the outcome of a command.
pub fn from_result<T, E>(result: &Result<T, E>) -> i32 {
    match result {
        Ok(_) => OK,
        Err(_) => FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;

    #[test]
    fn maps_success_and_every_failure() {
        assert_eq!(from_result::<(), StageError>(&Ok(())), OK);
        assert_eq!(from_result::<(), _>(&Err(StageError::Interrupted)), FAILURE);
        assert_eq!(
            from_result::<(), _>(&Err(StageError::Environment(
                "git installation not found".into()
            ))),
            FAILURE
        );
    }
}
