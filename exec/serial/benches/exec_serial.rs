exec::criterion_benchmark!(exec_serial::Serial);
