// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Launcher module - compute backends that run agent instances.

pub mod machines;
pub mod mock;
mod traits;

pub use machines::MachinesLauncher;
pub use mock::MockLauncher;
pub use traits::*;
