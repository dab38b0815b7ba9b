mod merge;
mod scoring;
