// Copyright 2024 Google LLC
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

use std::fmt;
use std::fmt::Display;

use anyhow::Context;

use crate::prelude::*;

#[macro_export]
macro_rules! fname {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        name.strip_suffix("::f").unwrap_or(name)
    }};
}
pub use fname;

/// Call site attached to an error as it propagates up through the harness.
pub struct Location {
    pub fname: &'static str,
    pub file: &'static str,
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at {}:{}", self.fname, self.file, self.line)
    }
}

#[macro_export]
macro_rules! loc {
    () => {
        $crate::utils::error::Location {
            fname: $crate::utils::error::fname!(),
            file: file!(),
            line: line!(),
        }
    };
}
pub use loc;

pub trait LocationContextExt<R, T, E>: Context<T, E> {
    fn with_context<C, F>(self, loc: Location, context: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;

    fn context<C>(self, loc: Location, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    fn location(self, loc: Location) -> Result<T>;
}

impl<R, T, E> LocationContextExt<R, T, E> for R
where
    R: Context<T, E>,
{
    fn with_context<C, F>(self, loc: Location, context: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        Context::with_context(self, || format!("{}: {}", loc, context()))
    }

    fn context<C>(self, loc: Location, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        LocationContextExt::with_context(self, loc, || context)
    }

    fn location(self, loc: Location) -> Result<T> {
        Context::with_context(self, || loc)
    }
}

/// Log a Result and then return it. Useful in cases such as
/// `read_config().log(loc!()).ok()`.
pub trait LogExt<T, E>: Context<T, E> {
    fn error(self, loc: Location) -> Result<T>;
    fn log(self, loc: Location) -> Result<T>;
}

impl<R, T, E> LogExt<T, E> for R
where
    R: Context<T, E>,
{
    fn error(self, loc: Location) -> Result<T> {
        let res = self.location(loc);
        if let Err(e) = &res {
            error!("{e:?}");
        }
        res
    }

    fn log(self, loc: Location) -> Result<T> {
        self.error(loc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fails() -> Result<()> {
        Err(anyhow!("inner"))
    }

    #[test]
    fn test_location_context_is_prepended() {
        let err = LocationContextExt::context(fails(), loc!(), "reading config")
            .expect_err("error must propagate");
        let msg = format!("{err:#}");
        assert!(msg.contains("reading config"), "{msg}");
        assert!(msg.contains("src/utils/error.rs"), "{msg}");
        assert!(msg.ends_with("inner"), "{msg}");
    }

    #[test]
    fn test_fname_names_enclosing_function() {
        fn outer() -> &'static str {
            fname!()
        }
        assert!(outer().ends_with("outer"), "{}", outer());
    }

    #[test]
    fn test_log_passes_through_ok() {
        let v: Result<u32> = Ok(7);
        assert_eq!(LogExt::log(v, loc!()).ok(), Some(7));
    }

    #[test]
    fn test_log_keeps_error_with_location() {
        let err = LogExt::log(fails(), loc!()).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("test_log_keeps_error_with_location"), "{msg}");
        assert!(msg.ends_with("inner"), "{msg}");
    }
}
