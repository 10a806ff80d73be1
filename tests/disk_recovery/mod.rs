mod restart_case1;
