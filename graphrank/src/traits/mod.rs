/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Basic traits to access graphs and identify them for caching purposes.

mod graph;
pub use graph::{GraphId, RandomAccessGraph};
