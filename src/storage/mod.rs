// SPDX-License-Identifier: Apache-2.0

pub mod memory_storage;
pub mod traits;
