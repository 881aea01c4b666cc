//! Exit codes for the CLI

use paramtask_core::ParamError;
use paramtask_tasks::TaskError;

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Invalid arguments or parameters
pub const USAGE_ERROR: i32 = 3;

/// A task failed or was never defined
pub const TASK_FAILED: i32 = 4;

/// Pick the exit code for an error
pub fn for_error(error: &anyhow::Error) -> i32 {
    if let Some(param_error) = error.downcast_ref::<ParamError>() {
        return match param_error {
            ParamError::Config(_) => CONFIG_ERROR,
            ParamError::SchedulerUnavailable(_) | ParamError::Other(_) => ERROR,
            _ => USAGE_ERROR,
        };
    }
    if error.downcast_ref::<TaskError>().is_some() {
        return TASK_FAILED;
    }
    ERROR
}
