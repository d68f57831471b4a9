mod broker;
mod processing;
