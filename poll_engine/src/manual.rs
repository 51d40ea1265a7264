/*!

This is the long-form manual for `poll_engine` and `pollctl`.

## Polls and votes

A poll has a title, an optional description and at least two options. The
options are fixed once the poll is created. A poll runs until its owner (or
an admin) switches it off, or until its end time, whichever comes first. A
poll whose end time is exactly now is already closed. A closed poll is
never reopened: create a new poll instead.

Every non-anonymous poll accepts at most one vote per voter. Anonymous polls
store no voter identity and accept every vote.

## Results

Results are computed from the votes every time they are requested.

* `counts`: one entry per option.
* `percentages`: whole percentages that always add up to 100 when there is
  at least one vote. They are rounded with the largest remainder method: each
  option gets the integer part of its share, and the missing points go to the
  options with the largest fractional parts (lowest option first on equal
  fractions).
* `winners`: every option sharing the highest count. Ties are never broken.

For example, with options `A`, `B`, `C` and votes `A`, `A`, `B`:

```text
counts       [2, 1, 0]
percentages  [67, 33, 0]
winners      [0]
```

## Archive outcomes

* `active`: the poll still accepts votes.
* `expired`: the end time has passed, whatever the stored flag says.
* `completed`: the poll was switched off before its end time, or it never had
  one.

## Data file

`pollctl` keeps its state in a JSON file, rewritten after every command that
changes it:

```text
{
  "polls": [
    {
      "id": 1,
      "title": "Bike lanes on Main Street",
      "options": ["Yes", "No"],
      "creator_id": "alice",
      "created_at": "2024-09-02T10:00:00Z",
      "ends_at": "2024-09-09T10:00:00Z",
      "privacy_mode": "public",
      "region": "Downtown",
      "is_active": true
    }
  ],
  "votes": [
    {
      "id": 1,
      "poll_id": 1,
      "voter_id": "bob",
      "option_index": 0,
      "cast_at": "2024-09-02T11:12:00Z"
    }
  ]
}
```

The file is checked when it is loaded: votes must point to existing polls and
options, and no voter may appear twice in the same non-anonymous poll.

## Configuration

`pollctl` accepts a configuration file in JSON with the `--config` flag. All
the fields are optional:

```text
{
  "dataFile": "polls.json",
  "admins": ["moderator"],
  "maxOptions": 64,
  "maxTitleLength": 200,
  "defaultPageSize": 20,
  "maxPageSize": 100
}
```

Flags given on the command line take precedence over the file. Set
`RUST_LOG=debug` or pass `--verbose` to see how each request is processed.

 */
