// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module

mod network_allocation;
mod stack_graph;
mod target_health;
