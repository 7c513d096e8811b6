// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Configuration for the dataset registry and per-dataset B+ trees.

use crate::error::{Error, Result};
use std::time::Duration;

/// Default maximum number of entries held in the dataset registry table.
pub const DEFAULT_REGISTRY_CAPACITY: usize = 100;

/// Default idle duration after which a loaded tree is evicted from memory.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default interval at which the background evictor scans the registry.
pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(30);

/// B+ tree order (degree) configuration.
///
/// Internal nodes hold up to `T - 1` keys and up to `T` children; leaves
/// hold up to `T - 1` keys. A node is full when its key count reaches `T`.
///
/// ## Example
/// ```
/// use reedkv::config::Order;
///
/// let order = Order::new(4).unwrap();
/// assert_eq!(order.max_keys(), 3);
/// assert_eq!(order.min_keys(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order(u16);

impl Order {
    /// Creates a new order, rejecting values below the minimum of 3.
    pub fn new(order: u16) -> Result<Self> {
        if order < 3 {
            return Err(Error::InvalidOrder { order });
        }
        Ok(Self(order))
    }

    /// Maximum keys per node (`T - 1`).
    #[must_use]
    pub fn max_keys(&self) -> u16 {
        self.0 - 1
    }

    /// Minimum keys per non-root node (`floor((T - 1) / 2)`).
    #[must_use]
    pub fn min_keys(&self) -> u16 {
        (self.0 - 1) / 2
    }

    /// The raw order value `T`.
    #[must_use]
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Registry-wide configuration for dataset lifecycle management.
///
/// ## Example
/// ```
/// use reedkv::config::RegistryConfig;
/// use std::time::Duration;
///
/// let config = RegistryConfig::new()
///     .capacity(50)
///     .idle_timeout(Duration::from_secs(60));
/// assert_eq!(config.capacity, 50);
/// ```
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Root directory holding one subdirectory per dataset plus
    /// `datasets.txt`.
    pub root: std::path::PathBuf,

    /// Maximum number of dataset entries the registry table may hold.
    pub capacity: usize,

    /// How long a loaded tree may sit idle before the evictor unloads it.
    pub idle_timeout: Duration,

    /// How often the background evictor scans the registry table.
    pub eviction_interval: Duration,
}

impl RegistryConfig {
    /// Creates a registry configuration rooted at the current directory with
    /// the default capacity, idle timeout, and eviction interval.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: std::path::PathBuf::from("."),
            capacity: DEFAULT_REGISTRY_CAPACITY,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            eviction_interval: DEFAULT_EVICTION_INTERVAL,
        }
    }

    /// Sets the root directory under which dataset directories and
    /// `datasets.txt` live.
    #[must_use]
    pub fn root(mut self, root: impl Into<std::path::PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Sets the maximum number of dataset entries.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the idle timeout after which a loaded tree becomes eviction
    /// eligible.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the background evictor's scan interval.
    #[must_use]
    pub fn eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = interval;
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_rejects_below_minimum() {
        assert!(Order::new(2).is_err());
        assert!(Order::new(3).is_ok());
    }

    #[test]
    fn order_key_bounds() {
        let order = Order::new(4).unwrap();
        assert_eq!(order.max_keys(), 3);
        assert_eq!(order.min_keys(), 1);

        let order = Order::new(5).unwrap();
        assert_eq!(order.max_keys(), 4);
        assert_eq!(order.min_keys(), 2);
    }

    #[test]
    fn registry_config_builder() {
        let config = RegistryConfig::new()
            .capacity(10)
            .idle_timeout(Duration::from_secs(5));
        assert_eq!(config.capacity, 10);
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
    }
}
