pub mod csv_parser;
pub mod predictions;
