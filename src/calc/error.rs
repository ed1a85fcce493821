// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use super::ListKind;

/// Error conditions which may occur during [RouteCalculator::route](super::RouteCalculator::route).
///
/// Any of these leaves the map consistent: temporary disturbances are rolled back
/// and the transient node state is reset before the next route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// No origin edge may be used by the vehicle, when routing forward.
    #[error("no valid start routing node")]
    NoValidStartRoutingNode,

    /// No destination edge may be used by the vehicle, when routing backward.
    #[error("no valid end routing node")]
    NoValidEndRoutingNode,

    /// One or more origins don't exist on the map.
    #[error("one or more invalid origins")]
    InvalidOrigins,

    /// One or more destinations don't exist on the map.
    #[error("one or more invalid destinations")]
    InvalidDestinations,

    /// The request kind is not routed by this calculator.
    #[error("{0:?} requests are not supported")]
    NotSupported(ListKind),

    /// Following the gradients from a node did not lead back to an origin
    /// within as many steps as there are nodes on the map.
    #[error("gradient cycle detected while reading route to node {node:#x}")]
    RouteCycle { node: u32 },

    /// The background reset of the previous route has panicked.
    /// The calculator has lost its map and can't route anymore.
    #[error("background reset task panicked")]
    ResetTaskPanicked,

    /// A panic occurred while the routing state was in use, leaving it in an
    /// unknown state. The calculator can't route anymore.
    #[error("routing state poisoned by an earlier panic")]
    EnginePoisoned,
}
