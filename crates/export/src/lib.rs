pub mod coerce;
pub mod datum;
pub mod dimensions;
pub mod driver;
pub mod output;
pub mod partition;
pub mod registry;
pub mod routed;
pub mod transport;

pub use driver::{BatchTransport, DriverState, ExportConfig, ExportDriver, WriteReport};
pub use output::{Output, OutputConfig};
pub use registry::OutputRegistry;
pub use routed::{RecordTransport, RoutedConfig, RoutedDriver};
