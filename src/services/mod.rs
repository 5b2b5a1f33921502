pub mod command_policy;
pub mod jumphost;
pub mod key_loader;
pub mod logger;
pub mod output_parser;
pub mod validation;
