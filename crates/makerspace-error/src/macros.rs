// Error handling macros

/// Return early with a configuration error if a condition is not satisfied
#[macro_export]
macro_rules! ensure_config {
    ($cond:expr, $($arg:tt)+) => {
        if !($cond) {
            return Err($crate::config_error(format!($($arg)+)));
        }
    };
}
