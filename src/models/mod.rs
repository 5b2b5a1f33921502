pub mod command;
pub mod device;
pub mod request;
pub mod result;

pub use command::{PipeFilter, PipeOperator, ShowCommand};
pub use device::{DeviceCredential, DeviceOs, JumphostConfig, JumphostKey};
pub use request::{
    DeviceInput, ExecutionRequest, ExecutionRequestInput, JumphostInput, OutputMode,
    ShowCommandInput,
};
pub use result::{
    aggregate, CommandResult, DeviceResult, ErrorEntry, ExecutionResponse, JumphostTestResult,
};
