// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: configuration loading and the long-lived status monitor the
// binary drives.

pub mod app_services;
pub mod config_dir;
