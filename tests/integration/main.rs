//! End-to-end tests: the real gateway, client, valuation and sinks driven
//! by a fake provider.

mod fake_provider;
mod pipeline;
