//! Fault injection HTTP filter configuration.
//!
//! Builds the `HTTPFault` payload from a cluster's fault annotations. A
//! sub-action (abort, delay) is only emitted when both its chance and its
//! parameter are positive, so a merely-enabled fault config can still
//! produce an empty filter.

use envoy_types::pb::envoy::extensions::filters::common::fault::v3::{
    fault_delay, FaultDelay,
};
use envoy_types::pb::envoy::extensions::filters::http::fault::v3::{
    fault_abort, FaultAbort, HttpFault,
};
use envoy_types::pb::envoy::r#type::v3::{fractional_percent, FractionalPercent};
use envoy_types::pb::google::protobuf::{Any, Duration};

use crate::provider::FaultConfig;
use crate::xds::resources::any_from_message;

const FAULT_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.fault.v3.HTTPFault";

fn percent(numerator: u32) -> FractionalPercent {
    FractionalPercent {
        numerator,
        denominator: fractional_percent::DenominatorType::Hundred as i32,
    }
}

/// Build the fault filter payload.
pub fn to_any(config: &FaultConfig) -> Any {
    let mut fault = HttpFault::default();

    if config.abort_chance > 0 && config.abort_code > 0 {
        fault.abort = Some(FaultAbort {
            error_type: Some(fault_abort::ErrorType::HttpStatus(config.abort_code)),
            percentage: Some(percent(config.abort_chance)),
        });
    }

    if config.delay_chance > 0 && !config.delay_duration.is_zero() {
        fault.delay = Some(FaultDelay {
            fault_delay_secifier: Some(fault_delay::FaultDelaySecifier::FixedDelay(Duration {
                seconds: config.delay_duration.as_secs() as i64,
                nanos: config.delay_duration.subsec_nanos() as i32,
            })),
            percentage: Some(percent(config.delay_chance)),
        });
    }

    any_from_message(FAULT_TYPE_URL, &fault)
}

/// Whether the config yields at least one active sub-action. Listeners skip
/// prepending the filter otherwise.
pub fn has_active_fault(config: &FaultConfig) -> bool {
    config.enabled
        && ((config.abort_chance > 0 && config.abort_code > 0)
            || (config.delay_chance > 0 && !config.delay_duration.is_zero()))
}
