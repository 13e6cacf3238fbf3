mod tests_compact;
