pub mod osu_parser;
pub mod osu_types;
pub mod primitive_parser;
