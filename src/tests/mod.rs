mod test_robot_construction;
