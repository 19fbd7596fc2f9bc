/*!

This is the long-form manual for `seat_apportionment` and `seatportal`.

## Apportionment rules

### Lower chamber: D'Hondt with a threshold

Lists below the threshold (3.00% by default) are excluded. Every other list
divides its percentage by 1, 2, 3, ... up to the number of seats in dispute,
and the seats go one by one to the highest quotients of that pool.

When no list reaches the threshold, every list with a positive share takes
part, so that seats are not left empty while votes exist. Lists that reported
exactly 0% never get a lower chamber seat.

### Upper chamber: majority and first minority

Three seats: two for the list with the highest share, one for the runner-up.
Every list with a stored share is ranked, including a list that reported 0%.
A single reporting list takes the three seats. A district that does not renew
its upper chamber declares 0 seats.

### Ties

With `useListOrder` (the default), equal percentages or quotients go to the list
with the lower `order`, then to the lower list code. With `random`, the lists
are ordered by a SHA-256 digest of the seed and the list code: the outcome is
hard to predict but anyone with the seed can reproduce it.

## Input formats

### Election file

A JSON file describing districts, lists and the rules. Percentages are strings
or numbers with at most two decimals; `null` or `""` means pending.

```text
{
  "outputSettings": { "electionName": "Legislativas 2025" },
  "rules": { "lowerThreshold": "3.00", "tiebreakMode": "useListOrder" },
  "districts": [
    { "id": "caba", "name": "CABA", "lowerSeats": 13, "upperSeats": 3,
      "registeredVoters": 2500000, "votesCast": 1800000,
      "tablesReporting": 7000, "tablesTotal": 7200 }
  ],
  "lists": [
    { "district": "caba", "code": "A01", "name": "Lista A", "order": 1,
      "nationalAlignment": "Alianza A" }
  ],
  "scrutiny": [
    { "district": "caba", "chamber": "lower", "list": "A01", "percentage": "45.20" }
  ],
  "scrutinySources": [ { "provider": "csv", "filePath": "sheet.csv" } ]
}
```

Each list takes part in both chambers unless `chambers` restricts it.

### csv

A scrutiny sheet. The header row is mandatory:

```text
district,chamber,list,percentage
caba,lower,A01,45.20
caba,lower,B01,
caba,upper,A01,51.00
```

Rows are grouped by district and chamber. Each group replaces all the records
of that district and chamber at once: a blank percentage removes the record of
that list, and lists missing from the group are treated as blank. If any value
of a group is invalid, or if the group adds up to more than 100%, the whole
group is rejected and the stored records stay as they were.

## Output

The summary is a JSON document with, for each district, the participation and
coverage percentages and one seat table per selected chamber. The seats of the
two chambers are always reported separately.

 */
