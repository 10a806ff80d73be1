mod memory_case1;
