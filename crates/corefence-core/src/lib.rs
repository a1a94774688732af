// Copyright [2026] [Corefence Contributors]
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Core isolation logic for corefence: the path containment guard, the
//! pinned core dataset verifier, the append-only namespace log, and the
//! projection/aggregation engine. Everything here is transport-agnostic;
//! the daemon crate wires it to HTTP.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod aggregate;
pub mod dataset;
pub mod error;
pub mod hashing;
pub mod jsonl;
pub mod safefs;

pub use error::{CoreError, CoreResult};
pub use jsonl::Record;
