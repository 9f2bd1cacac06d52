// Copyright (c) 2026 addr2field Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// Diagnostic logging setup
use flexi_logger::{FlexiLoggerError, Logger, LoggerHandle};

/// Default log level when `RUST_LOG` is unset.
pub fn default_level(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

/// Start the stderr logger. Must be called once at startup; keep the handle alive.
///
/// Stdout is reserved for results so that diagnostics never mix with them.
pub fn init_logger(debug: bool) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_env_or_str(default_level(debug))?
        .log_to_stderr()
        .start()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_selects_level() {
        assert_eq!(default_level(true), "debug");
        assert_eq!(default_level(false), "info");
    }
}
