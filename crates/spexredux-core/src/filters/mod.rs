pub mod median_filter;
