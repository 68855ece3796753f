/*
 * Trial Histories
 *
 * Layered record of one trial, from the raw step sequence up to the cached
 * structures the exploration strategies query:
 *
 *   base  - (thread, transition, previous value) per step, trace dump
 *   hb    - clock vectors, happens-before, per-location conflict frontiers
 *   hhb   - chained per-thread context hashes for duplicate-state pruning
 *   phhb  - per-step first-conflict cache for the pinning search
 */

pub mod base;
pub mod clock;
pub mod hb;
pub mod hhb;
pub mod objects;
pub mod phhb;

pub use clock::ClockVector;
pub use hhb::StateHash;
pub use phhb::PhhbHistory;
