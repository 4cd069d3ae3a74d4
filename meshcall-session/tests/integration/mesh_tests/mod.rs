mod test_peer_leaves;
